//! Container runtime abstraction.
//!
//! The engine only talks to a runtime through [`ContainerRuntime`], with an
//! explicit result struct per call instead of the runtime's wire shape.

pub mod docker;
#[cfg(any(test, feature = "testkit"))]
pub mod fake;

use std::collections::BTreeMap;

use aiserver_common::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of lifecycle events; ends when the subscription is lost.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent>>;

/// A published port requested at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host.
    pub host_port: u16,
    /// Host interface.
    pub host_ip: String,
}

/// Configuration for creating a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSpec {
    /// Container name.
    pub name: String,
    /// Image reference to run.
    pub image: String,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// `source:target` bind specifications.
    pub binds: Vec<String>,
    /// Command override; the image default when `None`.
    pub command: Option<Vec<String>>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Network to attach to.
    pub network: Option<String>,
    /// Restart policy.
    pub restart: Option<String>,
}

/// Result of inspecting a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Runtime identifier.
    pub id: String,
    /// Container name without a leading `/`.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Runtime state (`running`, `exited`, `created`, ...).
    pub state: String,
    /// Health status reported by the runtime's own healthcheck, if any.
    pub health: Option<String>,
    /// Host bindings keyed by `<port>/<proto>`, as `(host_ip, host_port)`.
    pub port_bindings: BTreeMap<String, Vec<(String, String)>>,
    /// Effective command.
    pub command: Vec<String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl ContainerDetails {
    /// Returns `true` if the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// One row of a container listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Runtime identifier.
    pub id: String,
    /// Container name without a leading `/`.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Runtime state.
    pub state: String,
    /// Human-readable published ports.
    pub ports: String,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl ContainerSummary {
    /// Returns `true` if the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// One locally available image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Image identifier.
    pub id: String,
    /// `repository:tag` references.
    pub tags: Vec<String>,
}

/// Progress line reported while pulling an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullProgress {
    /// Image being pulled.
    pub image: String,
    /// Status text.
    pub status: String,
}

/// Subscription parameters for the lifecycle event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events at or after this instant.
    pub since: DateTime<Utc>,
    /// Container actions of interest; empty means all.
    pub actions: Vec<String>,
}

impl EventFilter {
    /// Returns whether `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        event.time >= self.since
            && (self.actions.is_empty() || self.actions.iter().any(|a| *a == event.action))
    }
}

/// A container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Normalized action, e.g. `start` or `health_status`.
    pub action: String,
    /// Container identifier.
    pub container_id: String,
    /// Container name when the runtime includes it.
    pub container_name: Option<String>,
    /// Event time.
    pub time: DateTime<Utc>,
}

/// Output of a one-shot command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Capability interface over a container runtime.
///
/// Every call carries its own timeout inside the implementation.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks that the runtime is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime does not answer.
    async fn ping(&self) -> Result<()>;

    /// Inspects a container by name; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime call fails.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>>;

    /// Lists containers, including stopped ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime call fails.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Creates a container, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    /// Starts a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be stopped.
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Removes a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be removed.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Lists locally available images.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime call fails.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Returns whether `image` is available locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime call fails.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pulls an image, reporting progress lines to `progress`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails or times out.
    async fn pull_image(
        &self,
        image: &str,
        progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<()>;

    /// Lists network names.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime call fails.
    async fn list_networks(&self) -> Result<Vec<String>>;

    /// Creates a network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network cannot be created.
    async fn create_network(&self, name: &str, driver: &str) -> Result<()>;

    /// Lists volume names.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime call fails.
    async fn list_volumes(&self) -> Result<Vec<String>>;

    /// Creates a named volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume cannot be created.
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Subscribes to container lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe_events(&self, filter: &EventFilter) -> Result<EventStream>;

    /// Executes a one-shot command inside a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be executed.
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Returns the last `tail` log lines of a container, with timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if logs cannot be retrieved.
    async fn logs(&self, name: &str, tail: usize) -> Result<String>;
}
