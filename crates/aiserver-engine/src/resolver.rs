//! Dependency chain expansion and host-port preflight for a start request.

use std::collections::HashSet;
use std::time::Duration;

use aiserver_common::error::{OrchestratorError, Result};
use aiserver_registry::{Registry, ResolvedManifest};
use aiserver_runtime::ContainerSummary;
use tokio::net::TcpStream;

/// Dependencies that must be ready before `target`, dependencies first.
///
/// Callers must rule out cycles beforehand.
///
/// # Errors
///
/// Returns [`OrchestratorError::NotFound`] if `target` is not registered.
pub fn resolve_chain(registry: &Registry, target: &str) -> Result<Vec<String>> {
    let _ = registry.require(target)?;
    registry.resolve_chain(target)
}

/// Returns `true` if something accepts connections on `bind:port`.
pub async fn port_in_use(bind: &str, port: u16, timeout: Duration) -> bool {
    let host = match bind {
        "" | "0.0.0.0" => "127.0.0.1",
        "::" => "::1",
        other => other,
    };
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Checks every chain member's host ports, dependencies then target.
///
/// Modules whose container is already running are skipped. Two members
/// that would bind the same address and port also conflict. The first
/// conflict found wins.
///
/// # Errors
///
/// Returns [`OrchestratorError::PortConflict`] naming the module and bind.
pub async fn check_ports(
    chain: &[ResolvedManifest],
    snapshot: &[ContainerSummary],
    timeout: Duration,
) -> Result<()> {
    let mut claimed: HashSet<(String, u16)> = HashSet::new();
    for manifest in chain {
        let running = snapshot
            .iter()
            .any(|c| c.name == manifest.container_name && c.is_running());
        if running {
            tracing::debug!(module = %manifest.module, "already running; skipping port check");
            continue;
        }
        for port in &manifest.ports {
            let key = (port.bind_address.clone(), port.host_port);
            if !claimed.insert(key) || port_in_use(&port.bind_address, port.host_port, timeout).await {
                tracing::warn!(
                    module = %manifest.module,
                    bind = %port.bind_address,
                    port = port.host_port,
                    "port conflict"
                );
                return Err(OrchestratorError::PortConflict {
                    module: manifest.module.clone(),
                    bind: port.bind_address.clone(),
                    port: port.host_port,
                });
            }
        }
    }
    Ok(())
}
