//! Template materialization: base manifest, override fragment, and variable
//! substitution resolved into a [`ResolvedManifest`].

pub mod placeholder;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aiserver_common::config::GlobalConfig;
use aiserver_common::constants::{BIND_ADDRESS_VAR, DEFAULT_BIND_ADDRESS, DEFAULT_RESTART_POLICY};
use aiserver_common::error::{OrchestratorError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::manifest::{PortBinding, ResolvedManifest, VolumeBind};
use crate::naming;
use crate::schema::{HealthCheck, ModuleSchema, PortValue};
use placeholder::Unresolved;

/// Recursively merges `overlay` into `base`.
///
/// Objects merge key by key; arrays and scalars in `overlay` replace
/// whatever `base` held.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        let _ = base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Manifest-shaped document after substitution.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ManifestDoc {
    image: Option<String>,
    env: BTreeMap<String, Value>,
    ports: Vec<crate::schema::PortSpec>,
    volumes: Vec<crate::schema::VolumeSpec>,
    command: Option<Vec<String>>,
    restart: Option<String>,
    health_check: Option<HealthCheck>,
}

/// Resolves module schemas into concrete manifests.
///
/// Holds the lower variable layers (process environment, then global
/// configuration) so that each call is a pure function of the schema.
#[derive(Debug, Clone)]
pub struct Materializer {
    variables: BTreeMap<String, String>,
    bind_address: String,
}

impl Materializer {
    /// Builds a materializer from an explicit environment and configuration.
    pub fn new<I, K, V>(env: I, config: &GlobalConfig) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut variables: BTreeMap<String, String> =
            env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        for (key, value) in &config.variables {
            let _ = variables.insert(key.clone(), value.clone());
        }
        let bind_address = if config.bind_address.is_empty() {
            DEFAULT_BIND_ADDRESS.to_string()
        } else {
            config.bind_address.clone()
        };
        let _ = variables.insert(BIND_ADDRESS_VAR.to_string(), bind_address.clone());
        Self {
            variables,
            bind_address,
        }
    }

    /// Builds a materializer over the current process environment.
    pub fn from_process_env(config: &GlobalConfig) -> Self {
        Self::new(std::env::vars(), config)
    }

    /// Resolves `schema` into a concrete manifest.
    ///
    /// # Errors
    ///
    /// * [`OrchestratorError::TemplateMissing`] if a referenced template file is absent.
    /// * [`OrchestratorError::VariablesMissing`] naming every unresolved variable.
    /// * [`OrchestratorError::TemplateInvalid`] if a placeholder is malformed, or
    ///   the result lacks an image or has a non-numeric port.
    pub fn materialize(&self, schema: &ModuleSchema) -> Result<ResolvedManifest> {
        // Layers: template file, then inline schema fields, then the fragment.
        let template = schema.template.as_ref();
        let mut doc = match template.and_then(|t| t.file.as_deref()) {
            Some(file) => load_template(schema, file)?,
            None => Value::Object(Map::new()),
        };
        deep_merge(&mut doc, &inline_manifest(schema)?);
        if let Some(fragment) = template.and_then(|t| t.fragment.as_ref()) {
            deep_merge(&mut doc, fragment);
        }

        let mut unresolved = Unresolved::default();
        let dictionary = self.dictionary(schema, &mut unresolved);
        substitute_value(&mut doc, &dictionary, &mut unresolved);
        if !unresolved.malformed.is_empty() {
            let tokens: Vec<String> = unresolved.malformed.into_iter().collect();
            return Err(invalid(schema, format!("malformed placeholders: {}", tokens.join(", "))));
        }
        if !unresolved.missing.is_empty() {
            return Err(OrchestratorError::VariablesMissing {
                module: schema.name.clone(),
                names: unresolved.missing.into_iter().collect(),
            });
        }

        let doc: ManifestDoc = serde_json::from_value(doc).map_err(|e| invalid(schema, e.to_string()))?;
        let manifest = self.concretize(schema, doc)?;
        tracing::debug!(module = %schema.name, fingerprint = %manifest.fingerprint, "manifest materialized");
        Ok(manifest)
    }

    /// Layers module variables, each evaluated against the lower layers only.
    fn dictionary(&self, schema: &ModuleSchema, unresolved: &mut Unresolved) -> BTreeMap<String, String> {
        let mut dictionary = self.variables.clone();
        for (name, expression) in &schema.variables {
            let value = placeholder::substitute(
                expression,
                |key| self.variables.get(key).map(String::as_str),
                unresolved,
            );
            let _ = dictionary.insert(name.clone(), value);
        }
        dictionary
    }

    fn concretize(&self, schema: &ModuleSchema, doc: ManifestDoc) -> Result<ResolvedManifest> {
        let image = doc
            .image
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| invalid(schema, "image is required"))?;

        let mut ports = Vec::new();
        for spec in doc.ports {
            let container_port = parse_port(schema, &spec.container_port)?
                .ok_or_else(|| invalid(schema, "container port must be non-zero"))?;
            let Some(host_port) = spec
                .host_port
                .as_ref()
                .map(|p| parse_port(schema, p))
                .transpose()?
                .flatten()
            else {
                continue;
            };
            let bind_address = spec
                .bind_address
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| self.bind_address.clone());
            ports.push(PortBinding {
                container_port,
                host_port,
                bind_address,
            });
        }

        let env = doc
            .env
            .into_iter()
            .map(|(k, v)| (k, scalar_to_string(v)))
            .collect();

        Ok(ResolvedManifest {
            module: schema.name.clone(),
            module_type: schema.module_type,
            container_name: naming::primary_container(schema),
            image,
            env,
            ports,
            volumes: doc
                .volumes
                .into_iter()
                .map(|v| VolumeBind {
                    host_path: v.host_path,
                    container_path: v.container_path,
                })
                .collect(),
            command: doc.command.filter(|c| !c.is_empty()),
            restart: doc
                .restart
                .unwrap_or_else(|| DEFAULT_RESTART_POLICY.to_string()),
            health_check: doc.health_check,
            fingerprint: String::new(),
        }
        .sealed())
    }
}

fn invalid(schema: &ModuleSchema, message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::TemplateInvalid {
        module: schema.name.clone(),
        message: message.into(),
    }
}

/// Serializes the manifest-shaped fields declared inline on the schema.
fn inline_manifest(schema: &ModuleSchema) -> Result<Value> {
    let mut doc = Map::new();
    if let Some(image) = &schema.image {
        let _ = doc.insert("image".into(), Value::String(image.clone()));
    }
    if !schema.env.is_empty() {
        let _ = doc.insert("env".into(), serde_json::to_value(&schema.env)?);
    }
    if !schema.ports.is_empty() {
        let _ = doc.insert("ports".into(), serde_json::to_value(&schema.ports)?);
    }
    if !schema.volumes.is_empty() {
        let _ = doc.insert("volumes".into(), serde_json::to_value(&schema.volumes)?);
    }
    if let Some(command) = &schema.command {
        let _ = doc.insert("command".into(), serde_json::to_value(command)?);
    }
    if let Some(restart) = &schema.restart {
        let _ = doc.insert("restart".into(), Value::String(restart.clone()));
    }
    if let Some(check) = &schema.health_check {
        let _ = doc.insert("healthCheck".into(), serde_json::to_value(check)?);
    }
    Ok(Value::Object(doc))
}

fn template_path(schema: &ModuleSchema, file: &Path) -> PathBuf {
    match &schema.source_dir {
        Some(dir) if file.is_relative() => dir.join(file),
        _ => file.to_path_buf(),
    }
}

fn load_template(schema: &ModuleSchema, file: &Path) -> Result<Value> {
    let path = template_path(schema, file);
    if !path.is_file() {
        return Err(OrchestratorError::TemplateMissing {
            module: schema.name.clone(),
            path,
        });
    }
    let content = std::fs::read_to_string(&path).map_err(|e| OrchestratorError::Io {
        path: path.clone(),
        source: e,
    })?;
    serde_yaml::from_str(&content).map_err(|e| invalid(schema, format!("{}: {e}", path.display())))
}

fn substitute_value(value: &mut Value, dictionary: &BTreeMap<String, String>, unresolved: &mut Unresolved) {
    match value {
        Value::String(text) => {
            if text.contains("${") {
                *text = placeholder::substitute(text, |key| dictionary.get(key).map(String::as_str), unresolved);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_value(item, dictionary, unresolved);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(item, dictionary, unresolved);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Parses a port value; `0` and empty strings mean "no binding".
fn parse_port(schema: &ModuleSchema, value: &PortValue) -> Result<Option<u16>> {
    let port = match value {
        PortValue::Number(n) => *n,
        PortValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<u16>()
                .map_err(|_| invalid(schema, format!("invalid port {text:?}")))?
        }
    };
    Ok((port != 0).then_some(port))
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema(value: Value) -> ModuleSchema {
        serde_json::from_value(value).expect("schema")
    }

    fn materializer(env: &[(&str, &str)]) -> Materializer {
        Materializer::new(env.iter().copied(), &GlobalConfig::default())
    }

    #[test]
    fn deep_merge_replaces_arrays_and_merges_objects() {
        let mut base = json!({"env": {"A": "1", "B": "2"}, "command": ["a", "b"], "image": "x"});
        deep_merge(&mut base, &json!({"env": {"B": "3"}, "command": ["c"]}));
        assert_eq!(base, json!({"env": {"A": "1", "B": "3"}, "command": ["c"], "image": "x"}));
    }

    #[test]
    fn resolves_defaults_and_bind_address() {
        let module = schema(json!({
            "name": "db", "type": "basic", "image": "postgres:15",
            "ports": [{"containerPort": 5432, "hostPort": "${DB_PORT:15432}"}]
        }));
        let manifest = materializer(&[]).materialize(&module).expect("materialize");
        assert_eq!(manifest.container_name, "ai-db");
        assert_eq!(
            manifest.ports,
            vec![PortBinding { container_port: 5432, host_port: 15432, bind_address: "127.0.0.1".into() }]
        );
        assert_eq!(manifest.restart, "unless-stopped");
    }

    #[test]
    fn module_variables_override_lower_layers() {
        let module = schema(json!({
            "name": "app", "type": "feature", "image": "app:1",
            "variables": {"APP_PORT": "${APP_PORT:8080}"},
            "env": {"URL": "http://${BIND_ADDRESS}:${APP_PORT}"}
        }));
        let manifest = materializer(&[("APP_PORT", "9090")]).materialize(&module).expect("materialize");
        assert_eq!(manifest.env["URL"], "http://127.0.0.1:9090");

        let manifest = materializer(&[]).materialize(&module).expect("materialize");
        assert_eq!(manifest.env["URL"], "http://127.0.0.1:8080");
    }

    #[test]
    fn global_config_variables_sit_above_environment() {
        let mut config = GlobalConfig::default();
        let _ = config.variables.insert("TZ".into(), "UTC".into());
        let module = schema(json!({"name": "a", "type": "basic", "image": "a", "env": {"TZ": "${TZ}"}}));
        let manifest = Materializer::new([("TZ", "Asia/Shanghai")], &config)
            .materialize(&module)
            .expect("materialize");
        assert_eq!(manifest.env["TZ"], "UTC");
    }

    #[test]
    fn single_missing_variable_is_named() {
        let module = schema(json!({
            "name": "app", "type": "feature", "image": "app:1",
            "env": {"TOKEN": "${API_TOKEN}", "MODE": "${MODE:prod}"}
        }));
        let err = materializer(&[]).materialize(&module).unwrap_err();
        match err {
            OrchestratorError::VariablesMissing { module, names } => {
                assert_eq!(module, "app");
                assert_eq!(names, vec!["API_TOKEN"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn all_missing_variables_are_reported_together() {
        let module = schema(json!({
            "name": "app", "type": "feature", "image": "${REGISTRY}/app:${TAG}",
            "variables": {"PORT": "${PORT_BASE}"},
            "env": {"TOKEN": "${API_TOKEN}"}
        }));
        let err = materializer(&[]).materialize(&module).unwrap_err();
        assert_eq!(err.code(), aiserver_common::error::ErrorCode::VarMissing);
        let msg = err.to_string();
        for name in ["API_TOKEN", "PORT_BASE", "REGISTRY", "TAG"] {
            assert!(msg.contains(name), "got: {msg}");
        }
    }

    #[test]
    fn materialization_is_deterministic() {
        let module = schema(json!({
            "name": "app", "type": "feature", "image": "app:1",
            "env": {"Z": "1", "A": "${A:2}", "M": "3"},
            "template": {"fragment": {"env": {"EXTRA": "x"}}}
        }));
        let m = materializer(&[]);
        let first = m.materialize(&module).expect("first");
        let second = m.materialize(&module).expect("second");
        assert_eq!(
            serde_json::to_vec(&first).expect("serialize"),
            serde_json::to_vec(&second).expect("serialize")
        );
        assert_eq!(first.fingerprint.len(), 64);
        assert_eq!(first.env["EXTRA"], "x");
    }

    #[test]
    fn fingerprint_tracks_content() {
        let module = schema(json!({"name": "a", "type": "basic", "image": "a:${TAG:1}"}));
        let one = materializer(&[]).materialize(&module).expect("materialize");
        let two = materializer(&[("TAG", "2")]).materialize(&module).expect("materialize");
        assert_ne!(one.fingerprint, two.fingerprint);
    }

    #[test]
    fn zero_or_empty_host_port_drops_binding() {
        let module = schema(json!({
            "name": "a", "type": "basic", "image": "a",
            "ports": [
                {"containerPort": 80, "hostPort": 0},
                {"containerPort": 81, "hostPort": "${OPT_PORT:}"},
                {"containerPort": 82}
            ]
        }));
        let manifest = materializer(&[]).materialize(&module).expect("materialize");
        assert!(manifest.ports.is_empty());
    }

    #[test]
    fn non_numeric_port_is_invalid() {
        let module = schema(json!({
            "name": "a", "type": "basic", "image": "a",
            "ports": [{"containerPort": 80, "hostPort": "http"}]
        }));
        let err = materializer(&[]).materialize(&module).unwrap_err();
        assert!(matches!(err, OrchestratorError::TemplateInvalid { .. }), "got: {err}");
    }

    #[test]
    fn missing_image_is_invalid() {
        let module = schema(json!({"name": "a", "type": "basic"}));
        let err = materializer(&[]).materialize(&module).unwrap_err();
        assert!(err.to_string().contains("image is required"), "got: {err}");
    }

    #[test]
    fn file_template_is_merged_under_fragment() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("web.yaml"),
            "image: nginx:1.25\nenv:\n  MODE: file\n  KEEP: yes-please\nports:\n  - containerPort: 80\n    hostPort: \"${WEB_PORT:18088}\"\n",
        )
        .expect("write");
        let mut module = schema(json!({
            "name": "web", "type": "feature",
            "template": {"file": "web.yaml", "fragment": {"env": {"MODE": "fragment"}}}
        }));
        module.source_dir = Some(dir.path().to_path_buf());
        let manifest = materializer(&[]).materialize(&module).expect("materialize");
        assert_eq!(manifest.image, "nginx:1.25");
        assert_eq!(manifest.env["MODE"], "fragment");
        assert_eq!(manifest.env["KEEP"], "yes-please");
        assert_eq!(manifest.ports[0].host_port, 18088);
    }

    #[test]
    fn inline_fields_override_the_template_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("web.yaml"),
            "image: nginx:1.25\nenv:\n  MODE: file\n  KEEP: kept\nports:\n  - containerPort: 80\n    hostPort: 18088\n",
        )
        .expect("write");
        let mut module = schema(json!({
            "name": "web", "type": "feature", "image": "nginx:1.27",
            "env": {"MODE": "inline"},
            "ports": [{"containerPort": 80, "hostPort": 28088}],
            "template": {"file": "web.yaml", "fragment": {"env": {"EXTRA": "fragment"}}}
        }));
        module.source_dir = Some(dir.path().to_path_buf());
        let manifest = materializer(&[]).materialize(&module).expect("materialize");
        assert_eq!(manifest.image, "nginx:1.27");
        assert_eq!(manifest.env["MODE"], "inline");
        assert_eq!(manifest.env["KEEP"], "kept");
        assert_eq!(manifest.env["EXTRA"], "fragment");
        assert_eq!(manifest.ports.len(), 1);
        assert_eq!(manifest.ports[0].host_port, 28088);
    }

    #[test]
    fn malformed_placeholder_is_invalid() {
        let module = schema(json!({
            "name": "app", "type": "feature", "image": "app:1",
            "env": {"TOKEN": "${my-var}", "OTHER": "${ABSENT}"}
        }));
        let err = materializer(&[]).materialize(&module).unwrap_err();
        assert_eq!(err.code(), aiserver_common::error::ErrorCode::TemplateInvalid);
        assert!(err.to_string().contains("${my-var}"), "got: {err}");
    }

    #[test]
    fn absent_template_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut module = schema(json!({"name": "web", "type": "feature", "template": {"file": "nope.yaml"}}));
        module.source_dir = Some(dir.path().to_path_buf());
        let err = materializer(&[]).materialize(&module).unwrap_err();
        assert_eq!(err.code(), aiserver_common::error::ErrorCode::TemplateMissing);
    }

    #[test]
    fn health_check_target_is_substituted() {
        let module = schema(json!({
            "name": "cache", "type": "basic", "image": "redis",
            "healthCheck": {"kind": "tcp", "target": "localhost:${REDIS_PORT:6379}", "retries": 3}
        }));
        let manifest = materializer(&[]).materialize(&module).expect("materialize");
        let check = manifest.health_check.expect("health check");
        assert_eq!(check.target.as_deref(), Some("localhost:6379"));
        assert_eq!(check.retries(), 3);
    }
}
