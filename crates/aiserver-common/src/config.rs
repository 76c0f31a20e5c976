//! Global configuration model for the orchestrator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{OrchestratorError, Result};

/// Root configuration for the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    /// Default host bind address for published ports.
    pub bind_address: String,
    /// Stop basic dependencies left without users after a feature stop.
    pub auto_stop_unused_deps: bool,
    /// Mirror hosts tried, in order, before the default public registry.
    pub registry_mirrors: Vec<String>,
    /// Extra attempts per pull candidate.
    pub pull_retries: u32,
    /// Modules whose failed health check does not abort a start.
    pub lenient_modules: Vec<String>,
    /// Global template variable layer.
    pub variables: BTreeMap<String, String>,
    /// Shared network settings.
    pub network: NetworkConfig,
    /// Named volumes ensured before the first start.
    pub volumes: Vec<String>,
    /// Module catalog locations.
    pub catalog: CatalogConfig,
    /// Container runtime client settings.
    pub runtime: RuntimeConfig,
    /// Status synchronizer timing.
    pub sync: SyncConfig,
    /// TTL of the container observation cache.
    pub observation_ttl_ms: u64,
    /// TTL of the module status cache.
    pub status_ttl_ms: u64,
    /// Per-port connect timeout during conflict checks.
    pub port_probe_timeout_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bind_address: constants::DEFAULT_BIND_ADDRESS.into(),
            auto_stop_unused_deps: false,
            registry_mirrors: Vec::new(),
            pull_retries: 2,
            lenient_modules: Vec::new(),
            variables: BTreeMap::new(),
            network: NetworkConfig::default(),
            volumes: constants::DEFAULT_VOLUMES.iter().map(|v| (*v).to_string()).collect(),
            catalog: CatalogConfig::default(),
            runtime: RuntimeConfig::default(),
            sync: SyncConfig::default(),
            observation_ttl_ms: 1_000,
            status_ttl_ms: 1_000,
            port_probe_timeout_ms: 800,
        }
    }
}

impl GlobalConfig {
    /// Loads configuration from a JSON file, returning defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| OrchestratorError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| OrchestratorError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Observation cache TTL.
    #[must_use]
    pub const fn observation_ttl(&self) -> Duration {
        Duration::from_millis(self.observation_ttl_ms)
    }

    /// Status cache TTL.
    #[must_use]
    pub const fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }

    /// Port probe connect timeout.
    #[must_use]
    pub const fn port_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.port_probe_timeout_ms)
    }
}

/// Shared network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Network name.
    pub name: String,
    /// Network driver.
    pub driver: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: constants::DEFAULT_NETWORK.into(),
            driver: constants::DEFAULT_NETWORK_DRIVER.into(),
        }
    }
}

/// Where module schemas are discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
    /// Directory replacing the embedded built-in catalog.
    pub builtin_dir: Option<PathBuf>,
    /// Directory of user override files.
    pub user_dir: Option<PathBuf>,
}

/// Container runtime client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Runtime CLI executable.
    pub command: String,
    /// Timeout applied to each runtime call.
    pub call_timeout_ms: u64,
    /// Timeout applied to a single image pull.
    pub pull_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: "docker".into(),
            call_timeout_ms: 30_000,
            pull_timeout_ms: 1_800_000,
        }
    }
}

impl RuntimeConfig {
    /// Per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Per-pull timeout.
    #[must_use]
    pub const fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}

/// Status synchronizer timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Pending-set drain interval.
    pub batch_interval_ms: u64,
    /// Delay before resubscribing after the event stream ends.
    pub retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: 1_000,
            retry_delay_ms: 5_000,
        }
    }
}

impl SyncConfig {
    /// Drain interval.
    #[must_use]
    pub const fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    /// Resubscribe delay.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = GlobalConfig::load(&dir.path().join("absent.json")).expect("load");
        assert_eq!(config, GlobalConfig::default());
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.volumes.len(), 6);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"bindAddress":"0.0.0.0","registryMirrors":["mirror.local"],"sync":{"batchIntervalMs":250}}"#,
        )
        .expect("write");
        let config = GlobalConfig::load(&path).expect("load");
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.registry_mirrors, vec!["mirror.local".to_string()]);
        assert_eq!(config.sync.batch_interval(), Duration::from_millis(250));
        assert_eq!(config.sync.retry_delay_ms, 5_000);
        assert_eq!(config.network.name, "ai-server-net");
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = GlobalConfig::load(&path).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config { .. }), "got: {err}");
    }
}
