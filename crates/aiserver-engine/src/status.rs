//! Folding container observations into user-facing module status.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use aiserver_common::constants::STOPPED_STATES;
use aiserver_common::error::Result;
use aiserver_common::types::{ModuleStatus, ModuleType, StatusKind};
use aiserver_registry::{Registry, naming};
use aiserver_runtime::ContainerSummary;
use tokio::time::Instant;

fn is_stopped(container: Option<&ContainerSummary>) -> bool {
    container.is_none_or(|c| STOPPED_STATES.contains(&c.state.as_str()))
}

/// Folds per-container observations: all running is running, all stopped
/// or missing is stopped, any other mix is an error.
#[must_use]
pub fn fold(observations: &[Option<&ContainerSummary>]) -> StatusKind {
    if !observations.is_empty() && observations.iter().all(|c| c.is_some_and(ContainerSummary::is_running)) {
        StatusKind::Running
    } else if observations.iter().all(|c| is_stopped(*c)) {
        StatusKind::Stopped
    } else {
        StatusKind::Error
    }
}

fn any_running(registry: &Registry, module: &str, snapshot: &[ContainerSummary]) -> bool {
    registry.get(module).is_some_and(|schema| {
        naming::container_names(schema)
            .iter()
            .any(|name| snapshot.iter().any(|c| c.name == *name && c.is_running()))
    })
}

/// Feature modules depending on `module` with at least one running container.
#[must_use]
pub fn used_by(registry: &Registry, module: &str, snapshot: &[ContainerSummary]) -> Vec<String> {
    registry
        .feature_dependents(module)
        .into_iter()
        .filter(|dependent| any_running(registry, dependent, snapshot))
        .collect()
}

/// Computes the status of `module` from a container listing.
///
/// # Errors
///
/// Returns [`aiserver_common::error::OrchestratorError::NotFound`] for an
/// unknown module.
pub fn compute_status(registry: &Registry, module: &str, snapshot: &[ContainerSummary]) -> Result<ModuleStatus> {
    let schema = registry.require(module)?;
    let names = naming::container_names(schema);
    let observations: Vec<Option<&ContainerSummary>> = names
        .iter()
        .map(|name| snapshot.iter().find(|c| c.name == *name))
        .collect();
    let status = fold(&observations);
    let ports = observations
        .iter()
        .flatten()
        .filter(|c| !c.ports.is_empty())
        .map(|c| (c.name.clone(), c.ports.clone()))
        .collect();
    let used_by = if schema.module_type == ModuleType::Basic {
        used_by(registry, module, snapshot)
    } else {
        Vec::new()
    };
    Ok(ModuleStatus {
        running: status == StatusKind::Running,
        status,
        ports,
        used_by,
    })
}

/// Per-module status cache with a monotonic TTL.
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, ModuleStatus)>>,
}

impl StatusCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached status if it is younger than the TTL.
    #[must_use]
    pub fn get(&self, module: &str) -> Option<ModuleStatus> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(module)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, status)| status.clone())
    }

    /// Stores a fresh status, returning the previous one regardless of age.
    pub fn put(&self, module: &str, status: ModuleStatus) -> Option<ModuleStatus> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_string(), (Instant::now(), status))
            .map(|(_, previous)| previous)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aiserver_registry::ModuleSchema;

    use super::*;

    fn summary(name: &str, state: &str) -> ContainerSummary {
        ContainerSummary {
            id: format!("id-{name}"),
            name: name.into(),
            state: state.into(),
            ports: if state == "running" { "127.0.0.1:1->1/tcp".into() } else { String::new() },
            labels: BTreeMap::new(),
            ..ContainerSummary::default()
        }
    }

    fn registry() -> Registry {
        let modules: Vec<ModuleSchema> = serde_json::from_str(
            r#"[
                {"name":"redis","type":"basic","image":"redis"},
                {"name":"n8n","type":"feature","image":"n8n","dependsOn":["redis"]},
                {"name":"dify","type":"feature","image":"dify","dependsOn":["redis"],"services":["dify-api","dify-web"]}
            ]"#,
        )
        .expect("modules");
        Registry::new(modules)
    }

    #[test]
    fn fold_rules() {
        let running = summary("a", "running");
        let exited = summary("b", "exited");
        let restarting = summary("c", "restarting");
        assert_eq!(fold(&[Some(&running), Some(&running)]), StatusKind::Running);
        assert_eq!(fold(&[None, Some(&exited)]), StatusKind::Stopped);
        assert_eq!(fold(&[Some(&running), None]), StatusKind::Error);
        assert_eq!(fold(&[Some(&restarting)]), StatusKind::Error);
    }

    #[test]
    fn multi_container_module_folds_all_services() {
        let registry = registry();
        let snapshot = vec![summary("ai-dify-api", "running"), summary("ai-dify-web", "exited")];
        let status = compute_status(&registry, "dify", &snapshot).expect("status");
        assert_eq!(status.status, StatusKind::Error);
        assert!(!status.running);
        assert_eq!(status.ports.keys().collect::<Vec<_>>(), vec!["ai-dify-api"]);
    }

    #[test]
    fn basic_module_reports_running_feature_users() {
        let registry = registry();
        let snapshot = vec![
            summary("ai-redis", "running"),
            summary("ai-n8n", "exited"),
            summary("ai-dify-web", "running"),
        ];
        let status = compute_status(&registry, "redis", &snapshot).expect("status");
        assert!(status.running);
        assert_eq!(status.used_by, vec!["dify"]);
    }

    #[test]
    fn missing_module_is_stopped_without_containers() {
        let registry = registry();
        let status = compute_status(&registry, "n8n", &[]).expect("status");
        assert_eq!(status, ModuleStatus::stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let cache = StatusCache::new(Duration::from_secs(1));
        assert!(cache.put("redis", ModuleStatus::stopped()).is_none());
        assert!(cache.get("redis").is_some());
        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(cache.get("redis").is_none());
        assert_eq!(cache.put("redis", ModuleStatus::stopped()), Some(ModuleStatus::stopped()));
    }
}
