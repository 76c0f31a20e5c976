//! In-memory [`ContainerRuntime`] for tests.
//!
//! Records every call, keeps containers, images, networks, and volumes in
//! memory, and broadcasts lifecycle events the way a real runtime would.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use aiserver_common::error::{OrchestratorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::broadcast;

use super::{
    ContainerDetails, ContainerRuntime, ContainerSummary, CreateSpec, EventFilter, EventStream,
    ExecOutput, ImageSummary, PullProgress, RuntimeEvent,
};

/// A call observed by [`FakeRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `ping`.
    Ping,
    /// `inspect_container(name)`.
    Inspect(String),
    /// `list_containers`.
    ListContainers,
    /// `create_container(name)`.
    Create(String),
    /// `start_container(name)`.
    Start(String),
    /// `stop_container(name)`.
    Stop(String),
    /// `remove_container(name)`.
    Remove(String),
    /// `list_images`.
    ListImages,
    /// `image_exists(image)`.
    ImageExists(String),
    /// `pull_image(image)`.
    Pull(String),
    /// `list_networks`.
    ListNetworks,
    /// `create_network(name)`.
    CreateNetwork(String),
    /// `list_volumes`.
    ListVolumes,
    /// `create_volume(name)`.
    CreateVolume(String),
    /// `subscribe_events`.
    Subscribe,
    /// `exec(name, cmd)`.
    Exec(String, Vec<String>),
    /// `logs(name)`.
    Logs(String),
}

impl RuntimeCall {
    /// Returns `true` for calls that change container state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Start(_) | Self::Stop(_) | Self::Remove(_)
        )
    }
}

#[derive(Debug, Default)]
struct FakeState {
    containers: BTreeMap<String, ContainerDetails>,
    images: BTreeSet<String>,
    networks: BTreeSet<String>,
    volumes: BTreeSet<String>,
    failing_pulls: BTreeSet<String>,
    failing_resources: BTreeSet<String>,
    logs: BTreeMap<String, String>,
    calls: Vec<RuntimeCall>,
    unreachable: bool,
    latency: Duration,
    next_id: u64,
}

/// In-memory runtime that records calls.
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    events: broadcast::Sender<RuntimeEvent>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(FakeState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, call: RuntimeCall) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(call);
        if state.unreachable {
            return Err(OrchestratorError::runtime("connect", "runtime unreachable"));
        }
        Ok(state)
    }

    /// Makes an image available locally.
    pub fn add_image(&self, image: &str) {
        let _ = self.state().images.insert(image.to_string());
    }

    /// Makes every pull of `image` fail.
    pub fn fail_pull(&self, image: &str) {
        let _ = self.state().failing_pulls.insert(image.to_string());
    }

    /// Makes creation of the named network or volume fail.
    pub fn fail_resource(&self, name: &str) {
        let _ = self.state().failing_resources.insert(name.to_string());
    }

    /// Makes every call fail as if the runtime were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Delays every runtime call by `latency` so concurrent callers interleave.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    async fn pause(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Inserts or replaces a container.
    pub fn put_container(&self, details: ContainerDetails) {
        let _ = self.state().containers.insert(details.name.clone(), details);
    }

    /// Overrides the runtime-reported health of a container.
    pub fn set_health(&self, name: &str, health: Option<&str>) {
        if let Some(c) = self.state().containers.get_mut(name) {
            c.health = health.map(str::to_string);
        }
    }

    /// Sets the log text returned for a container.
    pub fn set_logs(&self, name: &str, logs: &str) {
        let _ = self.state().logs.insert(name.to_string(), logs.to_string());
    }

    /// Current view of a container.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<ContainerDetails> {
        self.state().containers.get(name).cloned()
    }

    /// Whether the named network exists.
    #[must_use]
    pub fn has_network(&self, name: &str) -> bool {
        self.state().networks.contains(name)
    }

    /// Whether the named volume exists.
    #[must_use]
    pub fn has_volume(&self, name: &str) -> bool {
        self.state().volumes.contains(name)
    }

    /// Every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state().calls.clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Broadcasts a lifecycle event for `name` as the runtime would.
    pub fn emit(&self, action: &str, name: &str) {
        let id = self
            .state()
            .containers
            .get(name)
            .map_or_else(|| format!("id-{name}"), |c| c.id.clone());
        let _ = self.events.send(RuntimeEvent {
            action: action.to_string(),
            container_id: id,
            container_name: Some(name.to_string()),
            time: Utc::now(),
        });
    }

    fn set_state(&self, name: &str, running: bool) -> Result<()> {
        let mut state = self.state();
        let container = state.containers.get_mut(name).ok_or_else(|| OrchestratorError::NotFound {
            kind: "container",
            id: name.to_string(),
        })?;
        container.state = if running { "running" } else { "exited" }.to_string();
        Ok(())
    }
}

fn summary(details: &ContainerDetails) -> ContainerSummary {
    let ports = details
        .port_bindings
        .iter()
        .flat_map(|(key, bindings)| {
            bindings
                .iter()
                .map(move |(ip, port)| format!("{ip}:{port}->{key}"))
        })
        .collect::<Vec<_>>()
        .join(", ");
    ContainerSummary {
        id: details.id.clone(),
        name: details.name.clone(),
        image: details.image.clone(),
        state: details.state.clone(),
        ports,
        labels: details.labels.clone(),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        self.pause().await;
        let _state = self.enter(RuntimeCall::Ping)?;
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        self.pause().await;
        let state = self.enter(RuntimeCall::Inspect(name.to_string()))?;
        Ok(state.containers.get(name).cloned())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        self.pause().await;
        let state = self.enter(RuntimeCall::ListContainers)?;
        Ok(state.containers.values().map(summary).collect())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        self.pause().await;
        let mut state = self.enter(RuntimeCall::Create(spec.name.clone()))?;
        if state.containers.contains_key(&spec.name) {
            return Err(OrchestratorError::runtime(
                "create",
                format!("Conflict. The container name \"/{}\" is already in use", spec.name),
            ));
        }
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        let mut port_bindings: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for port in &spec.ports {
            port_bindings
                .entry(format!("{}/tcp", port.container_port))
                .or_default()
                .push((port.host_ip.clone(), port.host_port.to_string()));
        }
        let details = ContainerDetails {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: "created".into(),
            health: None,
            port_bindings,
            command: spec.command.clone().unwrap_or_default(),
            labels: spec.labels.clone(),
        };
        let _ = state.containers.insert(spec.name.clone(), details);
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.pause().await;
        drop(self.enter(RuntimeCall::Start(name.to_string()))?);
        self.set_state(name, true)?;
        self.emit("start", name);
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        self.pause().await;
        drop(self.enter(RuntimeCall::Stop(name.to_string()))?);
        self.set_state(name, false)?;
        self.emit("die", name);
        self.emit("stop", name);
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.pause().await;
        let mut state = self.enter(RuntimeCall::Remove(name.to_string()))?;
        if state.containers.remove(name).is_none() {
            return Err(OrchestratorError::NotFound {
                kind: "container",
                id: name.to_string(),
            });
        }
        drop(state);
        self.emit("destroy", name);
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.pause().await;
        let state = self.enter(RuntimeCall::ListImages)?;
        Ok(state
            .images
            .iter()
            .enumerate()
            .map(|(i, tag)| ImageSummary {
                id: format!("sha256:{i}"),
                tags: vec![tag.clone()],
            })
            .collect())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.pause().await;
        let state = self.enter(RuntimeCall::ImageExists(image.to_string()))?;
        Ok(state.images.contains(image))
    }

    async fn pull_image(
        &self,
        image: &str,
        progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<()> {
        self.pause().await;
        let mut state = self.enter(RuntimeCall::Pull(image.to_string()))?;
        if state.failing_pulls.contains(image) {
            return Err(OrchestratorError::runtime("pull", format!("manifest for {image} not found")));
        }
        let _ = state.images.insert(image.to_string());
        drop(state);
        progress(PullProgress {
            image: image.to_string(),
            status: "Pull complete".into(),
        });
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        self.pause().await;
        let state = self.enter(RuntimeCall::ListNetworks)?;
        Ok(state.networks.iter().cloned().collect())
    }

    async fn create_network(&self, name: &str, _driver: &str) -> Result<()> {
        self.pause().await;
        let mut state = self.enter(RuntimeCall::CreateNetwork(name.to_string()))?;
        if state.failing_resources.contains(name) {
            return Err(OrchestratorError::runtime("create network", "permission denied"));
        }
        let _ = state.networks.insert(name.to_string());
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<String>> {
        self.pause().await;
        let state = self.enter(RuntimeCall::ListVolumes)?;
        Ok(state.volumes.iter().cloned().collect())
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.pause().await;
        let mut state = self.enter(RuntimeCall::CreateVolume(name.to_string()))?;
        if state.failing_resources.contains(name) {
            return Err(OrchestratorError::runtime("create volume", "no space left on device"));
        }
        let _ = state.volumes.insert(name.to_string());
        Ok(())
    }

    async fn subscribe_events(&self, filter: &EventFilter) -> Result<EventStream> {
        self.pause().await;
        drop(self.enter(RuntimeCall::Subscribe)?);
        let receiver = self.events.subscribe();
        let filter = filter.clone();
        let stream = futures::stream::unfold((receiver, filter), |(mut receiver, filter)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if filter.matches(&event) => return Some((Ok(event), (receiver, filter))),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        self.pause().await;
        let state = self.enter(RuntimeCall::Exec(name.to_string(), cmd.to_vec()))?;
        let running = state.containers.get(name).is_some_and(ContainerDetails::is_running);
        Ok(if running {
            ExecOutput {
                exit_code: 0,
                stdout: "OK\n".into(),
                stderr: String::new(),
            }
        } else {
            ExecOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("container {name} is not running"),
            }
        })
    }

    async fn logs(&self, name: &str, _tail: usize) -> Result<String> {
        self.pause().await;
        let state = self.enter(RuntimeCall::Logs(name.to_string()))?;
        if !state.containers.contains_key(name) {
            return Err(OrchestratorError::NotFound {
                kind: "container",
                id: name.to_string(),
            });
        }
        Ok(state.logs.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PortMapping;

    #[tokio::test]
    async fn lifecycle_is_recorded_and_broadcast() {
        let runtime = FakeRuntime::new();
        let mut stream = runtime
            .subscribe_events(&EventFilter {
                since: Utc::now(),
                actions: vec!["start".into()],
            })
            .await
            .expect("subscribe");

        let spec = CreateSpec {
            name: "ai-redis".into(),
            image: "redis:7".into(),
            ports: vec![PortMapping {
                container_port: 6379,
                host_port: 16379,
                host_ip: "127.0.0.1".into(),
            }],
            ..CreateSpec::default()
        };
        let _ = runtime.create_container(&spec).await.expect("create");
        runtime.start_container("ai-redis").await.expect("start");

        let event = stream.next().await.expect("event").expect("ok");
        assert_eq!(event.action, "start");
        assert_eq!(event.container_name.as_deref(), Some("ai-redis"));

        let listed = runtime.list_containers().await.expect("list");
        assert_eq!(listed[0].ports, "127.0.0.1:16379->6379/tcp");
        assert!(listed[0].is_running());
        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::Subscribe,
                RuntimeCall::Create("ai-redis".into()),
                RuntimeCall::Start("ai-redis".into()),
                RuntimeCall::ListContainers,
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let runtime = FakeRuntime::new();
        let spec = CreateSpec {
            name: "ai-a".into(),
            image: "a".into(),
            ..CreateSpec::default()
        };
        let _ = runtime.create_container(&spec).await.expect("create");
        let err = runtime.create_container(&spec).await.unwrap_err();
        assert!(err.to_string().contains("already in use"), "got: {err}");
    }

    #[tokio::test]
    async fn unreachable_runtime_fails_every_call() {
        let runtime = FakeRuntime::new();
        runtime.set_unreachable(true);
        let err = runtime.ping().await.unwrap_err();
        assert_eq!(err.code(), aiserver_common::error::ErrorCode::Runtime);
    }
}
