//! Domain value types shared by the registry, engine, and CLI.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a module in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// Shared infrastructure other modules may depend on.
    Basic,
    /// User-facing module built on basic modules.
    Feature,
    /// Missing or unrecognized value; rejected by registry validation.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ModuleType {
    /// Returns the lowercase name used in labels and catalog files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Feature => "feature",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state of a module across all of its containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Every container is running.
    Running,
    /// Every container is stopped or absent.
    Stopped,
    /// Containers disagree.
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// User-facing status of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    /// Whether the module is fully running.
    pub running: bool,
    /// Folded status.
    pub status: StatusKind,
    /// Published ports as reported by the runtime, keyed by container name.
    pub ports: BTreeMap<String, String>,
    /// Running feature modules that depend on this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_by: Vec<String>,
}

impl ModuleStatus {
    /// Status for a module with no container at all.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            running: false,
            status: StatusKind::Stopped,
            ports: BTreeMap::new(),
            used_by: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_type_deserializes() {
        let ty: ModuleType = serde_json::from_str("\"gateway\"").expect("deserialize");
        assert_eq!(ty, ModuleType::Unknown);
        let ty: ModuleType = serde_json::from_str("\"basic\"").expect("deserialize");
        assert_eq!(ty, ModuleType::Basic);
    }

    #[test]
    fn status_serializes_camel_case() {
        let mut status = ModuleStatus::stopped();
        status.used_by.push("dify".into());
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["usedBy"][0], "dify");
    }
}
