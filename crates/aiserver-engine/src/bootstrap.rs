//! Idempotent preparation of the shared network and named volumes.

use aiserver_common::config::GlobalConfig;
use aiserver_common::error::{OrchestratorError, Result};
use aiserver_runtime::ContainerRuntime;
use serde::Serialize;

/// What a bootstrap pass created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    /// Whether the shared network had to be created.
    pub network_created: bool,
    /// Volumes that had to be created.
    pub volumes_created: Vec<String>,
}

/// Ensures the shared network and every configured volume exist.
///
/// # Errors
///
/// Returns [`OrchestratorError::Runtime`] if the runtime is unreachable and
/// [`OrchestratorError::Preflight`] if a resource cannot be listed or created.
pub async fn ensure_resources(runtime: &dyn ContainerRuntime, config: &GlobalConfig) -> Result<BootstrapReport> {
    runtime.ping().await?;
    let mut report = BootstrapReport::default();

    let network = &config.network.name;
    let networks = runtime.list_networks().await.map_err(|e| preflight(network, &e))?;
    if !networks.iter().any(|n| n == network) {
        match runtime.create_network(network, &config.network.driver).await {
            Ok(()) => {
                tracing::info!(network = %network, driver = %config.network.driver, "network created");
                report.network_created = true;
            }
            // A concurrent bootstrap may have created it first.
            Err(e) => {
                let now = runtime.list_networks().await.map_err(|e| preflight(network, &e))?;
                if !now.iter().any(|n| n == network) {
                    return Err(preflight(network, &e));
                }
                tracing::debug!(network = %network, "network created concurrently");
            }
        }
    }

    let existing = runtime.list_volumes().await.map_err(|e| preflight("volumes", &e))?;
    for volume in &config.volumes {
        if existing.iter().any(|v| v == volume) {
            continue;
        }
        runtime.create_volume(volume).await.map_err(|e| preflight(volume, &e))?;
        tracing::info!(volume = %volume, "volume created");
        report.volumes_created.push(volume.clone());
    }
    Ok(report)
}

fn preflight(resource: &str, error: &OrchestratorError) -> OrchestratorError {
    tracing::error!(resource, error = %error, "resource bootstrap failed");
    OrchestratorError::Preflight {
        resource: resource.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use aiserver_common::error::ErrorCode;
    use aiserver_runtime::backend::fake::{FakeRuntime, RuntimeCall};

    use super::*;

    #[tokio::test]
    async fn creates_missing_resources_once() {
        let runtime = FakeRuntime::new();
        let config = GlobalConfig::default();
        let first = ensure_resources(&runtime, &config).await.expect("bootstrap");
        assert!(first.network_created);
        assert_eq!(first.volumes_created.len(), config.volumes.len());
        assert!(runtime.has_network(&config.network.name));

        runtime.clear_calls();
        let second = ensure_resources(&runtime, &config).await.expect("bootstrap");
        assert_eq!(second, BootstrapReport::default());
        assert!(!runtime.calls().iter().any(|c| matches!(
            c,
            RuntimeCall::CreateNetwork(_) | RuntimeCall::CreateVolume(_)
        )));
    }

    #[tokio::test]
    async fn volume_failure_is_a_preflight_error() {
        let runtime = FakeRuntime::new();
        runtime.fail_resource("ai-server-redis-data");
        let err = ensure_resources(&runtime, &GlobalConfig::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PreflightResource);
        assert!(err.to_string().contains("ai-server-redis-data"), "got: {err}");
    }

    #[tokio::test]
    async fn network_failure_is_a_preflight_error() {
        let runtime = FakeRuntime::new();
        let config = GlobalConfig::default();
        runtime.fail_resource(&config.network.name);
        let err = ensure_resources(&runtime, &config).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PreflightResource);
        assert!(!runtime.has_network(&config.network.name));
    }

    #[tokio::test]
    async fn unreachable_runtime_is_a_runtime_error() {
        let runtime = FakeRuntime::new();
        runtime.set_unreachable(true);
        let err = ensure_resources(&runtime, &GlobalConfig::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Runtime);
    }
}
