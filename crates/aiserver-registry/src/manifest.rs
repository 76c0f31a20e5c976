//! Fully concrete container specification produced by materialization.

use std::collections::BTreeMap;

use aiserver_common::types::ModuleType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schema::HealthCheck;

/// A placeholder-free container specification for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedManifest {
    /// Owning module.
    pub module: String,
    /// Module role, recorded as a container label.
    pub module_type: ModuleType,
    /// Container created for the module.
    pub container_name: String,
    /// Image reference as declared (before any mirror rewrite).
    pub image: String,
    /// Flattened environment.
    pub env: BTreeMap<String, String>,
    /// Numeric host port bindings.
    pub ports: Vec<PortBinding>,
    /// Volume binds.
    pub volumes: Vec<VolumeBind>,
    /// Command override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Restart policy.
    pub restart: String,
    /// Readiness probe with placeholders resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    /// Hex SHA-256 over every other field.
    #[serde(default)]
    pub fingerprint: String,
}

/// A concrete host port binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host.
    pub host_port: u16,
    /// Host interface.
    pub bind_address: String,
}

impl PortBinding {
    /// Runtime port key, e.g. `5432/tcp`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// A concrete volume bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBind {
    /// Named volume or host path.
    pub host_path: String,
    /// Mount point inside the container.
    pub container_path: String,
}

impl VolumeBind {
    /// `host:container` bind string.
    #[must_use]
    pub fn spec(&self) -> String {
        format!("{}:{}", self.host_path, self.container_path)
    }
}

impl ResolvedManifest {
    /// Computes the fingerprint over every field except the fingerprint itself.
    #[must_use]
    pub fn compute_fingerprint(&self) -> String {
        let mut unsigned = self.clone();
        unsigned.fingerprint.clear();
        let bytes = serde_json::to_vec(&unsigned).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Returns the manifest with its fingerprint filled in.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.fingerprint = self.compute_fingerprint();
        self
    }
}
