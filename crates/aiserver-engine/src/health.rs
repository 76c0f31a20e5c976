//! Readiness probing with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use aiserver_registry::{HealthCheck, HealthKind};
use aiserver_runtime::ContainerRuntime;
use tokio::net::TcpStream;

/// Outcome of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Healthy,
    Retry,
    /// Definitive failure; stop retrying.
    Unhealthy,
}

/// Waits for a module to report ready according to its health check.
pub struct HealthProber {
    runtime: Arc<dyn ContainerRuntime>,
    http: reqwest::Client,
}

impl std::fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber").finish_non_exhaustive()
    }
}

impl HealthProber {
    /// Creates a prober that polls container health through `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            http: reqwest::Client::new(),
        }
    }

    /// Returns `true` once `check` passes, `false` when retries run out or
    /// the runtime reports the container unhealthy.
    ///
    /// No check means healthy. `container` is the probe target for
    /// `container_healthy` checks without an explicit target.
    pub async fn wait_healthy(&self, container: &str, check: Option<&HealthCheck>) -> bool {
        let Some(check) = check else {
            return true;
        };
        let target = match (check.kind, check.target.as_deref()) {
            (_, Some(target)) if !target.is_empty() => target.to_string(),
            (HealthKind::ContainerHealthy, _) => container.to_string(),
            (kind, _) => {
                tracing::warn!(container, ?kind, "health check has no target");
                return false;
            }
        };
        let retries = check.retries().max(1);
        let interval = Duration::from_millis(check.interval_ms());
        let timeout = Duration::from_millis(check.timeout_ms());

        for attempt in 1..=retries {
            match self.probe(check.kind, &target, timeout).await {
                Attempt::Healthy => {
                    tracing::info!(container, target = %target, attempt, "health check passed");
                    return true;
                }
                Attempt::Unhealthy => {
                    tracing::warn!(container, target = %target, "container reported unhealthy");
                    return false;
                }
                Attempt::Retry => {
                    tracing::debug!(container, target = %target, attempt, retries, "health check pending");
                }
            }
            if attempt < retries {
                tokio::time::sleep(interval).await;
            }
        }
        tracing::warn!(container, target = %target, retries, "health check retries exhausted");
        false
    }

    async fn probe(&self, kind: HealthKind, target: &str, timeout: Duration) -> Attempt {
        match kind {
            HealthKind::Tcp => probe_tcp(target, timeout).await,
            HealthKind::Http => self.probe_http(target, timeout).await,
            HealthKind::ContainerHealthy => self.probe_container(target).await,
        }
    }

    async fn probe_http(&self, url: &str, timeout: Duration) -> Attempt {
        match self.http.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => Attempt::Healthy,
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "http probe not ready");
                Attempt::Retry
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "http probe failed");
                Attempt::Retry
            }
        }
    }

    async fn probe_container(&self, name: &str) -> Attempt {
        match self.runtime.inspect_container(name).await {
            Ok(Some(details)) => match details.health.as_deref() {
                Some("healthy") => Attempt::Healthy,
                Some("unhealthy") => Attempt::Unhealthy,
                _ => Attempt::Retry,
            },
            Ok(None) => Attempt::Retry,
            Err(e) => {
                tracing::debug!(container = name, error = %e, "inspect failed during health probe");
                Attempt::Retry
            }
        }
    }
}

async fn probe_tcp(target: &str, timeout: Duration) -> Attempt {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_)) => Attempt::Healthy,
        _ => Attempt::Retry,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aiserver_runtime::ContainerDetails;
    use aiserver_runtime::backend::fake::{FakeRuntime, RuntimeCall};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn check(kind: HealthKind, target: Option<&str>, retries: u32) -> HealthCheck {
        HealthCheck {
            kind,
            target: target.map(str::to_string),
            retries: Some(retries),
            interval_ms: Some(10),
            timeout_ms: Some(200),
        }
    }

    fn prober(runtime: &Arc<FakeRuntime>) -> HealthProber {
        HealthProber::new(runtime.clone())
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr").port()
    }

    #[tokio::test]
    async fn no_check_is_healthy() {
        let runtime = Arc::new(FakeRuntime::new());
        assert!(prober(&runtime).wait_healthy("ai-x", None).await);
    }

    #[tokio::test]
    async fn tcp_succeeds_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let target = listener.local_addr().expect("addr").to_string();
        let runtime = Arc::new(FakeRuntime::new());
        let c = check(HealthKind::Tcp, Some(&target), 3);
        assert!(prober(&runtime).wait_healthy("ai-x", Some(&c)).await);
    }

    #[tokio::test]
    async fn tcp_gives_up_after_retries() {
        let port = closed_port().await;
        let runtime = Arc::new(FakeRuntime::new());
        let c = check(HealthKind::Tcp, Some(&format!("127.0.0.1:{port}")), 3);
        assert!(!prober(&runtime).wait_healthy("ai-x", Some(&c)).await);
    }

    #[tokio::test]
    async fn missing_target_is_unhealthy() {
        let runtime = Arc::new(FakeRuntime::new());
        let c = check(HealthKind::Http, None, 3);
        assert!(!prober(&runtime).wait_healthy("ai-x", Some(&c)).await);
    }

    #[tokio::test]
    async fn http_accepts_2xx() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0_u8; 1024];
            let _ = socket.read(&mut buf).await.expect("read");
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .expect("write");
        });
        let runtime = Arc::new(FakeRuntime::new());
        let c = check(HealthKind::Http, Some(&format!("http://{addr}/health")), 2);
        assert!(prober(&runtime).wait_healthy("ai-x", Some(&c)).await);
        server.await.expect("server");
    }

    fn container(health: Option<&str>) -> ContainerDetails {
        ContainerDetails {
            id: "1".into(),
            name: "ai-es".into(),
            image: "es".into(),
            state: "running".into(),
            health: health.map(str::to_string),
            port_bindings: BTreeMap::new(),
            command: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn container_healthy_uses_runtime_health() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(container(Some("healthy")));
        let c = check(HealthKind::ContainerHealthy, None, 5);
        assert!(prober(&runtime).wait_healthy("ai-es", Some(&c)).await);
    }

    #[tokio::test]
    async fn unhealthy_container_fails_without_retrying() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(container(Some("unhealthy")));
        let c = check(HealthKind::ContainerHealthy, None, 5);
        assert!(!prober(&runtime).wait_healthy("ai-es", Some(&c)).await);
        assert_eq!(runtime.calls(), vec![RuntimeCall::Inspect("ai-es".into())]);
    }

    #[tokio::test]
    async fn starting_container_is_retried() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(container(Some("starting")));
        let c = check(HealthKind::ContainerHealthy, None, 4);
        assert!(!prober(&runtime).wait_healthy("ai-es", Some(&c)).await);
        assert_eq!(runtime.calls().len(), 4);
    }
}
