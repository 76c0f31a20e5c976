//! Declarative module schema as read from catalog files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aiserver_common::types::ModuleType;
use serde::{Deserialize, Serialize};

/// Static declaration of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSchema {
    /// Unique module name.
    #[serde(default)]
    pub name: String,
    /// Module role.
    #[serde(rename = "type", default)]
    pub module_type: ModuleType,
    /// Modules that must be ready before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Container image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Container environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Published ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    /// Volume binds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
    /// Module-scoped template variables, each an expression that may carry a default.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Readiness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    /// Container command override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Restart policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    /// A failed health check does not abort a start that depends on this module.
    #[serde(default)]
    pub lenient: bool,
    /// Modules started in the background after this one is up.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companions: Vec<String>,
    /// Service names whose containers make up this module's status.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    /// File-backed base manifest and override fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateSpec>,
    /// Lifecycle hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    /// Directory of the catalog file that last contributed to this module.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

/// A value that may be written as a number or as a templated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    /// Literal port.
    Number(u16),
    /// Templated or textual port.
    Text(String),
}

/// A published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    /// Port inside the container.
    #[serde(alias = "container")]
    pub container_port: PortValue,
    /// Port on the host; `0` or empty disables the binding.
    #[serde(alias = "host", default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<PortValue>,
    /// Host bind address; defaults to the configured bind address.
    #[serde(alias = "bind", default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
}

/// A volume or host-path bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Named volume or host path.
    #[serde(alias = "host")]
    pub host_path: String,
    /// Mount point inside the container.
    #[serde(alias = "container")]
    pub container_path: String,
}

/// Probe flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthKind {
    /// TCP connect to `host:port`.
    Tcp,
    /// HTTP GET expecting 2xx.
    Http,
    /// Runtime-reported container health.
    ContainerHealthy,
}

/// Readiness probe declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Probe flavour.
    #[serde(alias = "type")]
    pub kind: HealthKind,
    /// `host:port` for tcp, URL for http, unused for `container_healthy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Attempts before giving up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Sleep between attempts.
    #[serde(alias = "interval", default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Per-attempt timeout.
    #[serde(alias = "timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl HealthCheck {
    /// Attempts, falling back to the per-kind default.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(match self.kind {
            HealthKind::Tcp => 20,
            HealthKind::Http | HealthKind::ContainerHealthy => 30,
        })
    }

    /// Interval between attempts in milliseconds.
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(2_000)
    }

    /// Per-attempt timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(match self.kind {
            HealthKind::Tcp | HealthKind::ContainerHealthy => 2_000,
            HealthKind::Http => 5_000,
        })
    }
}

/// File-backed base manifest and inline override fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// Manifest document relative to the catalog file.
    #[serde(alias = "templateRef", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Fragment deep-merged over the base manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<serde_json::Value>,
}

/// Lifecycle hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    /// Commands executed inside the container after it becomes healthy.
    #[serde(alias = "postUp", default, skip_serializing_if = "Vec::is_empty")]
    pub post_start: Vec<Vec<String>>,
}

impl ModuleSchema {
    /// Returns whether the module is declared lenient.
    #[must_use]
    pub const fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Post-start diagnostic commands, if any.
    #[must_use]
    pub fn post_start(&self) -> &[Vec<String>] {
        self.lifecycle
            .as_ref()
            .map_or(&[], |l| l.post_start.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_short_field_aliases() {
        let schema: ModuleSchema = serde_json::from_str(
            r#"{
                "name": "cache",
                "type": "basic",
                "ports": [{"container": 6379, "host": "${PORT:6379}", "bind": "0.0.0.0"}],
                "volumes": [{"host": "data", "container": "/data"}],
                "healthCheck": {"type": "tcp", "target": "localhost:6379", "interval": 100}
            }"#,
        )
        .expect("parse");
        assert_eq!(schema.ports[0].container_port, PortValue::Number(6379));
        assert_eq!(
            schema.ports[0].host_port,
            Some(PortValue::Text("${PORT:6379}".into()))
        );
        let check = schema.health_check.expect("health check");
        assert_eq!(check.kind, HealthKind::Tcp);
        assert_eq!(check.interval_ms(), 100);
        assert_eq!(check.retries(), 20);
    }

    #[test]
    fn missing_type_is_unknown() {
        let schema: ModuleSchema = serde_json::from_str(r#"{"name":"x"}"#).expect("parse");
        assert_eq!(schema.module_type, ModuleType::Unknown);
        assert!(schema.post_start().is_empty());
    }
}
