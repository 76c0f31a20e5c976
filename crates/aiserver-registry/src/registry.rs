//! In-memory module registry and its lazily loaded cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use aiserver_common::config::CatalogConfig;
use aiserver_common::error::{OrchestratorError, Result};
use aiserver_common::types::ModuleType;

use crate::graph::DependencyGraph;
use crate::schema::ModuleSchema;
use crate::{loader, naming, validator};

/// Immutable name-to-schema mapping plus its dependency graph.
#[derive(Debug)]
pub struct Registry {
    modules: Vec<ModuleSchema>,
    by_name: HashMap<String, usize>,
    graph: DependencyGraph,
}

impl Registry {
    /// Builds a registry from modules in declaration order.
    ///
    /// The first module wins on duplicate names; [`Registry::validate`]
    /// reports the duplicate.
    #[must_use]
    pub fn new(modules: Vec<ModuleSchema>) -> Self {
        let mut by_name = HashMap::with_capacity(modules.len());
        for (idx, module) in modules.iter().enumerate() {
            let _ = by_name.entry(module.name.clone()).or_insert(idx);
        }
        let graph = DependencyGraph::from_modules(&modules);
        Self {
            modules,
            by_name,
            graph,
        }
    }

    /// Loads the catalog described by `config`.
    ///
    /// # Errors
    ///
    /// Propagates loader errors.
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        Ok(Self::new(loader::load(config)?))
    }

    /// All modules in declaration order.
    #[must_use]
    pub fn modules(&self) -> &[ModuleSchema] {
        &self.modules
    }

    /// Looks up a module by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleSchema> {
        self.by_name.get(name).map(|&idx| &self.modules[idx])
    }

    /// Looks up a module by name, failing if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for unknown names.
    pub fn require(&self, name: &str) -> Result<&ModuleSchema> {
        self.get(name).ok_or_else(|| OrchestratorError::NotFound {
            kind: "module",
            id: name.to_string(),
        })
    }

    /// The module dependency graph.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Validation issues for the loaded modules.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        validator::validate(&self.modules)
    }

    /// Transitive dependencies of `target`, dependencies first.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for an unknown target.
    pub fn resolve_chain(&self, target: &str) -> Result<Vec<String>> {
        self.graph.resolve_chain(target)
    }

    /// Modules whose status depends on the named container.
    #[must_use]
    pub fn modules_for_container(&self, container: &str) -> Vec<String> {
        naming::modules_for_container(&self.modules, container)
    }

    /// Feature modules that declare a direct dependency on `module`.
    #[must_use]
    pub fn feature_dependents(&self, module: &str) -> Vec<String> {
        self.graph
            .dependents(module)
            .into_iter()
            .filter(|name| {
                self.get(name)
                    .is_some_and(|m| m.module_type == ModuleType::Feature)
            })
            .collect()
    }
}

/// Lazily loaded registry, cached until explicitly invalidated.
#[derive(Debug)]
pub struct RegistryCache {
    config: CatalogConfig,
    slot: RwLock<Option<Arc<Registry>>>,
}

impl RegistryCache {
    /// Creates an empty cache that loads from `config` on first use.
    #[must_use]
    pub const fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            slot: RwLock::new(None),
        }
    }

    /// Creates a cache pre-populated with `registry`.
    #[must_use]
    pub fn with_registry(config: CatalogConfig, registry: Registry) -> Self {
        Self {
            config,
            slot: RwLock::new(Some(Arc::new(registry))),
        }
    }

    /// Returns the cached registry, loading it if needed.
    ///
    /// # Errors
    ///
    /// Propagates loader errors; a failed load is not cached.
    pub fn get(&self) -> Result<Arc<Registry>> {
        if let Some(registry) = self.slot.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(registry));
        }
        let registry = Arc::new(Registry::load(&self.config)?);
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(slot.get_or_insert(registry)))
    }

    /// Drops the cached registry so the next [`RegistryCache::get`] reloads it.
    pub fn invalidate(&self) {
        tracing::info!("module registry cache invalidated");
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_valid() {
        let registry = Registry::load(&CatalogConfig::default()).expect("load");
        assert!(registry.validate().is_empty(), "{:?}", registry.validate());
        assert_eq!(
            registry.resolve_chain("dify").expect("chain"),
            vec!["postgres", "redis", "minio", "qdrant"]
        );
        assert_eq!(registry.feature_dependents("redis"), vec!["dify", "oneapi", "ragflow"]);
        assert!(registry.feature_dependents("dify").is_empty());
    }

    #[test]
    fn require_unknown_module_fails() {
        let registry = Registry::new(Vec::new());
        let err = registry.require("ghost").unwrap_err();
        assert_eq!(err.code(), aiserver_common::error::ErrorCode::NotFound);
    }

    #[test]
    fn cache_reloads_after_invalidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.json"), r#"{"name":"a","type":"basic","image":"a:1"}"#)
            .expect("write");
        let cache = RegistryCache::new(CatalogConfig {
            builtin_dir: Some(dir.path().to_path_buf()),
            user_dir: None,
        });
        let first = cache.get().expect("load");
        assert!(Arc::ptr_eq(&first, &cache.get().expect("cached")));

        std::fs::write(dir.path().join("a.json"), r#"{"name":"a","type":"basic","image":"a:2"}"#)
            .expect("write");
        assert_eq!(cache.get().expect("cached").require("a").expect("a").image.as_deref(), Some("a:1"));
        cache.invalidate();
        assert_eq!(cache.get().expect("reload").require("a").expect("a").image.as_deref(), Some("a:2"));
    }
}
