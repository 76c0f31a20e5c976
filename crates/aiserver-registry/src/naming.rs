//! Container naming conventions and the reverse container-to-module mapping.

use aiserver_common::constants::CONTAINER_PREFIX;

use crate::schema::ModuleSchema;

/// Container name for a module or service name.
#[must_use]
pub fn container_name(name: &str) -> String {
    format!("{CONTAINER_PREFIX}{name}")
}

/// All containers whose state makes up the module's status.
#[must_use]
pub fn container_names(schema: &ModuleSchema) -> Vec<String> {
    if schema.services.is_empty() {
        vec![container_name(&schema.name)]
    } else {
        schema.services.iter().map(|s| container_name(s)).collect()
    }
}

/// The container the reconciler creates for this module.
#[must_use]
pub fn primary_container(schema: &ModuleSchema) -> String {
    schema
        .services
        .first()
        .map_or_else(|| container_name(&schema.name), |s| container_name(s))
}

/// Strips the leading `/` some runtimes prepend to container names.
#[must_use]
pub fn normalize_container_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Modules whose status depends on `container`, in declaration order.
#[must_use]
pub fn modules_for_container(modules: &[ModuleSchema], container: &str) -> Vec<String> {
    let container = normalize_container_name(container);
    if !container.starts_with(CONTAINER_PREFIX) {
        return Vec::new();
    }
    modules
        .iter()
        .filter(|m| container_names(m).iter().any(|c| c == container))
        .map(|m| m.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(json: &str) -> ModuleSchema {
        serde_json::from_str(json).expect("schema")
    }

    #[test]
    fn plain_module_maps_to_prefixed_name() {
        let redis = schema(r#"{"name":"redis","type":"basic"}"#);
        assert_eq!(primary_container(&redis), "ai-redis");
        assert_eq!(container_names(&redis), vec!["ai-redis"]);
    }

    #[test]
    fn services_expand_and_map_back() {
        let modules = vec![
            schema(r#"{"name":"dify","type":"feature","services":["dify-api","dify-web"]}"#),
            schema(r#"{"name":"dify-web","type":"feature"}"#),
        ];
        assert_eq!(primary_container(&modules[0]), "ai-dify-api");
        assert_eq!(modules_for_container(&modules, "/ai-dify-web"), vec!["dify", "dify-web"]);
        assert_eq!(modules_for_container(&modules, "ai-dify-api"), vec!["dify"]);
        assert!(modules_for_container(&modules, "postgres").is_empty());
    }
}
