//! Lifecycle reconciliation: converge one module's container onto its
//! resolved manifest.
//!
//! The existing container is inspected first. With no drift, a running
//! container is left alone and a stopped one is started. Any drift (image,
//! port bindings, command) forces stop, remove, and recreate. Images are only
//! acquired when a container has to be created.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use aiserver_common::constants::{LABEL_MANIFEST_HASH, LABEL_MODULE, LABEL_TYPE};
use aiserver_common::error::{OrchestratorError, Result};
use aiserver_registry::ResolvedManifest;
use aiserver_runtime::{ContainerDetails, ContainerRuntime, CreateSpec, PortMapping, PullProgress};
use serde::Serialize;

use crate::image;

/// What [`Reconciler::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsureOutcome {
    /// Already correct and running.
    Unchanged,
    /// Existing container started.
    Started,
    /// New container created and started.
    Created,
    /// Drifted container replaced.
    Recreated,
}

/// A divergence between the desired manifest and a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// Container runs an image that is not among the pull candidates.
    Image {
        /// Image of the existing container.
        actual: String,
    },
    /// Published ports differ.
    Ports,
    /// Declared command differs.
    Command,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image { actual } => write!(f, "image ({actual})"),
            Self::Ports => f.write_str("ports"),
            Self::Command => f.write_str("command"),
        }
    }
}

type BindingSet = BTreeMap<String, BTreeSet<(String, String)>>;

fn normalize_ip(ip: &str) -> String {
    if ip.is_empty() { "0.0.0.0".into() } else { ip.to_string() }
}

fn desired_bindings(manifest: &ResolvedManifest) -> BindingSet {
    let mut out = BindingSet::new();
    for port in &manifest.ports {
        let _ = out
            .entry(port.key())
            .or_default()
            .insert((normalize_ip(&port.bind_address), port.host_port.to_string()));
    }
    out
}

fn actual_bindings(details: &ContainerDetails) -> BindingSet {
    details
        .port_bindings
        .iter()
        .filter(|(_, bindings)| !bindings.is_empty())
        .map(|(key, bindings)| {
            let set = bindings
                .iter()
                .map(|(ip, port)| (normalize_ip(ip), port.clone()))
                .collect();
            (key.clone(), set)
        })
        .collect()
}

/// Computes the drift set of `details` against `manifest`.
#[must_use]
pub fn drift(manifest: &ResolvedManifest, details: &ContainerDetails, candidates: &[String]) -> Vec<Drift> {
    let mut out = Vec::new();
    if !candidates.iter().any(|c| *c == details.image) {
        out.push(Drift::Image {
            actual: details.image.clone(),
        });
    }
    if desired_bindings(manifest) != actual_bindings(details) {
        out.push(Drift::Ports);
    }
    if manifest
        .command
        .as_ref()
        .is_some_and(|cmd| *cmd != details.command)
    {
        out.push(Drift::Command);
    }
    out
}

/// Converges containers onto manifests through a [`ContainerRuntime`].
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    mirrors: Vec<String>,
    pull_retries: u32,
    pull_backoff: Duration,
    network: Option<String>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("mirrors", &self.mirrors)
            .field("pull_retries", &self.pull_retries)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        mirrors: Vec<String>,
        pull_retries: u32,
        network: Option<String>,
    ) -> Self {
        Self {
            runtime,
            mirrors,
            pull_retries,
            pull_backoff: Duration::from_secs(1),
            network,
        }
    }

    /// Overrides the delay between pull attempts of one candidate.
    #[must_use]
    pub const fn with_pull_backoff(mut self, backoff: Duration) -> Self {
        self.pull_backoff = backoff;
        self
    }

    /// Ensures the manifest's container exists, matches, and is running.
    ///
    /// # Errors
    ///
    /// Returns runtime errors, or [`OrchestratorError::ImagePull`] once every
    /// pull candidate has failed.
    pub async fn ensure(&self, manifest: &ResolvedManifest) -> Result<EnsureOutcome> {
        let name = &manifest.container_name;
        let candidates = image::candidates(&manifest.image, &self.mirrors);
        let mut replaced = false;

        if let Some(existing) = self.runtime.inspect_container(name).await? {
            let drift = drift(manifest, &existing, &candidates);
            if drift.is_empty() {
                if existing.is_running() {
                    tracing::debug!(module = %manifest.module, container = %name, "container up to date");
                    return Ok(EnsureOutcome::Unchanged);
                }
                self.runtime.start_container(name).await?;
                tracing::info!(module = %manifest.module, container = %name, "container started");
                return Ok(EnsureOutcome::Started);
            }
            let reasons: Vec<String> = drift.iter().map(ToString::to_string).collect();
            tracing::info!(
                module = %manifest.module,
                container = %name,
                drift = %reasons.join(", "),
                "configuration drift; recreating container"
            );
            if existing.is_running() {
                self.runtime.stop_container(name).await?;
            }
            self.runtime.remove_container(name).await?;
            replaced = true;
        }

        let image = self.acquire_image(&candidates).await?;
        let spec = self.create_spec(manifest, image);
        let _ = self.runtime.create_container(&spec).await?;
        self.runtime.start_container(name).await?;
        tracing::info!(module = %manifest.module, container = %name, image = %spec.image, "container running");
        Ok(if replaced {
            EnsureOutcome::Recreated
        } else {
            EnsureOutcome::Created
        })
    }

    /// Returns the first candidate present locally, otherwise pulls
    /// candidates in order, each with its own retries.
    async fn acquire_image(&self, candidates: &[String]) -> Result<String> {
        for candidate in candidates {
            if self.runtime.image_exists(candidate).await? {
                return Ok(candidate.clone());
            }
        }
        let progress = |p: PullProgress| {
            tracing::debug!(image = %p.image, status = %p.status, "pull progress");
        };
        let mut last_error = None;
        for candidate in candidates {
            for attempt in 0..=self.pull_retries {
                if attempt > 0 {
                    tokio::time::sleep(self.pull_backoff).await;
                }
                match self.runtime.pull_image(candidate, &progress).await {
                    Ok(()) => return Ok(candidate.clone()),
                    Err(e) => {
                        tracing::warn!(image = %candidate, attempt, error = %e, "pull failed");
                        last_error = Some((candidate.clone(), e));
                    }
                }
            }
        }
        let (image, error) = last_error.map_or_else(
            || (String::new(), "no pull candidates".to_string()),
            |(image, e)| (image, e.to_string()),
        );
        Err(OrchestratorError::ImagePull { image, message: error })
    }

    fn create_spec(&self, manifest: &ResolvedManifest, image: String) -> CreateSpec {
        let labels = BTreeMap::from([
            (LABEL_MODULE.to_string(), manifest.module.clone()),
            (LABEL_TYPE.to_string(), manifest.module_type.to_string()),
            (LABEL_MANIFEST_HASH.to_string(), manifest.fingerprint.clone()),
        ]);
        CreateSpec {
            name: manifest.container_name.clone(),
            image,
            env: manifest.env.clone(),
            ports: manifest
                .ports
                .iter()
                .map(|p| PortMapping {
                    container_port: p.container_port,
                    host_port: p.host_port,
                    host_ip: p.bind_address.clone(),
                })
                .collect(),
            binds: manifest.volumes.iter().map(aiserver_registry::VolumeBind::spec).collect(),
            command: manifest.command.clone(),
            labels,
            network: self.network.clone(),
            restart: Some(manifest.restart.clone()),
        }
    }
}
