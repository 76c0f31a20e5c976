//! Docker CLI implementation of [`ContainerRuntime`].
//!
//! Every call shells out to the configured executable with a per-call
//! timeout and parses `--format '{{json .}}'` output into typed structs.

use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::time::Duration;

use aiserver_common::config::RuntimeConfig;
use aiserver_common::error::{OrchestratorError, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{
    ContainerDetails, ContainerRuntime, ContainerSummary, CreateSpec, EventFilter, EventStream,
    ExecOutput, ImageSummary, PullProgress, RuntimeEvent,
};

/// Runtime backed by the `docker` command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    call_timeout: Duration,
    pull_timeout: Duration,
}

impl DockerCli {
    /// Creates a client from runtime configuration.
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            program: config.command.clone(),
            call_timeout: config.call_timeout(),
            pull_timeout: config.pull_timeout(),
        }
    }

    async fn output(&self, operation: &str, args: &[String]) -> Result<Output> {
        tracing::debug!(operation, args = ?args, "runtime call");
        let child = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();
        tokio::time::timeout(self.call_timeout, child)
            .await
            .map_err(|_| {
                OrchestratorError::runtime(operation, format!("timed out after {:?}", self.call_timeout))
            })?
            .map_err(|e| OrchestratorError::runtime(operation, format!("failed to run {}: {e}", self.program)))
    }

    /// Runs a command and returns its stdout, failing on a non-zero exit.
    async fn run(&self, operation: &str, args: &[String]) -> Result<String> {
        let output = self.output(operation, args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(OrchestratorError::runtime(
                operation,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn run_lines(&self, operation: &str, args: &[String]) -> Result<Vec<String>> {
        let stdout = self.run(operation, args).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<()> {
        let _ = self
            .run("ping", &args(["version", "--format", "{{.Server.Version}}"]))
            .await?;
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        let output = self
            .output("inspect", &args(["inspect", "--type", "container", name]))
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_object(&stderr) {
                return Ok(None);
            }
            return Err(OrchestratorError::runtime("inspect", stderr.trim()));
        }
        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let lines = self
            .run_lines("list containers", &args(["ps", "-a", "--no-trunc", "--format", "{{json .}}"]))
            .await?;
        Ok(lines.iter().filter_map(|l| parse_ps_line(l)).collect())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        let stdout = self.run("create", &create_args(spec)).await?;
        let id = stdout.trim().to_string();
        tracing::info!(name = %spec.name, id = %id, "container created");
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let _ = self.run("start", &args(["start", name])).await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        let _ = self.run("stop", &args(["stop", name])).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let _ = self.run("remove", &args(["rm", name])).await?;
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let lines = self
            .run_lines("list images", &args(["images", "--format", "{{json .}}"]))
            .await?;
        Ok(lines.iter().filter_map(|l| parse_image_line(l)).collect())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self
            .output("inspect image", &args(["image", "inspect", "--format", "{{.Id}}", image]))
            .await?;
        Ok(output.status.success())
    }

    async fn pull_image(
        &self,
        image: &str,
        progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<()> {
        tracing::info!(image, "pulling image");
        let mut child = Command::new(&self.program)
            .args(["pull", image])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestratorError::runtime("pull", e.to_string()))?;
        let stdout = child.stdout.take();
        let work = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    progress(PullProgress {
                        image: image.to_string(),
                        status: line,
                    });
                }
            }
            child.wait_with_output().await
        };
        let output = tokio::time::timeout(self.pull_timeout, work)
            .await
            .map_err(|_| OrchestratorError::runtime("pull", format!("{image} timed out")))?
            .map_err(|e| OrchestratorError::runtime("pull", e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(OrchestratorError::runtime(
                "pull",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        self.run_lines("list networks", &args(["network", "ls", "--format", "{{.Name}}"]))
            .await
    }

    async fn create_network(&self, name: &str, driver: &str) -> Result<()> {
        let _ = self
            .run("create network", &args(["network", "create", "--driver", driver, name]))
            .await?;
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<String>> {
        self.run_lines("list volumes", &args(["volume", "ls", "--format", "{{.Name}}"]))
            .await
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        let _ = self
            .run("create volume", &args(["volume", "create", name]))
            .await?;
        Ok(())
    }

    async fn subscribe_events(&self, filter: &EventFilter) -> Result<EventStream> {
        let since = format!(
            "{}.{:09}",
            filter.since.timestamp(),
            filter.since.timestamp_subsec_nanos()
        );
        let mut cmd_args = args(["events", "--format", "{{json .}}", "--filter", "type=container", "--since"]);
        cmd_args.push(since);
        for action in &filter.actions {
            cmd_args.push("--filter".into());
            cmd_args.push(format!("event={action}"));
        }
        let mut child = Command::new(&self.program)
            .args(&cmd_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestratorError::runtime("subscribe events", e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::runtime("subscribe events", "no stdout"))?;
        let lines = BufReader::new(stdout).lines();
        let filter = filter.clone();

        let stream = futures::stream::unfold((lines, child, filter), |(mut lines, child, filter)| async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_event(&line).filter(|e| filter.matches(e)) {
                            return Some((Ok(event), (lines, child, filter)));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        tracing::warn!(error = %e, "event stream read failed");
                        return None;
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        let mut cmd_args = args(["exec", name]);
        cmd_args.extend(cmd.iter().cloned());
        let output = self.output("exec", &cmd_args).await?;
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn logs(&self, name: &str, tail: usize) -> Result<String> {
        let tail = tail.to_string();
        let output = self
            .output("logs", &args(["logs", "--timestamps", "--tail", tail.as_str(), name]))
            .await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if is_missing_object(&stderr) {
                return Err(OrchestratorError::NotFound {
                    kind: "container",
                    id: name.to_string(),
                });
            }
            return Err(OrchestratorError::runtime("logs", stderr.trim()));
        }
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&stderr);
        Ok(logs)
    }
}

/// Builds `docker create` arguments for `spec`.
fn create_args(spec: &CreateSpec) -> Vec<String> {
    let mut out = args(["create", "--name", spec.name.as_str()]);
    for (key, value) in &spec.labels {
        out.push("--label".into());
        out.push(format!("{key}={value}"));
    }
    if let Some(network) = &spec.network {
        out.push("--network".into());
        out.push(network.clone());
    }
    if let Some(restart) = &spec.restart {
        out.push("--restart".into());
        out.push(restart.clone());
    }
    for (key, value) in &spec.env {
        out.push("-e".into());
        out.push(format!("{key}={value}"));
    }
    for port in &spec.ports {
        out.push("-p".into());
        out.push(format!("{}:{}:{}/tcp", port.host_ip, port.host_port, port.container_port));
    }
    for bind in &spec.binds {
        out.push("-v".into());
        out.push(bind.clone());
    }
    out.push(spec.image.clone());
    if let Some(command) = &spec.command {
        out.extend(command.iter().cloned());
    }
    out
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectDoc {
    id: String,
    name: String,
    state: InspectState,
    config: InspectConfig,
    host_config: InspectHostConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectState {
    status: String,
    health: Option<InspectHealth>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectHealth {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectConfig {
    image: String,
    cmd: Option<Vec<String>>,
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectHostConfig {
    port_bindings: Option<BTreeMap<String, Option<Vec<InspectBinding>>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectBinding {
    host_ip: String,
    host_port: String,
}

fn parse_inspect(stdout: &str) -> Result<Option<ContainerDetails>> {
    let docs: Vec<InspectDoc> = serde_json::from_str(stdout)?;
    Ok(docs.into_iter().next().map(|doc| ContainerDetails {
        id: doc.id,
        name: doc.name.trim_start_matches('/').to_string(),
        image: doc.config.image,
        state: doc.state.status,
        health: doc.state.health.map(|h| h.status).filter(|s| !s.is_empty()),
        port_bindings: doc
            .host_config
            .port_bindings
            .unwrap_or_default()
            .into_iter()
            .map(|(key, bindings)| {
                let pairs = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| (b.host_ip, b.host_port))
                    .collect();
                (key, pairs)
            })
            .collect(),
        command: doc.config.cmd.unwrap_or_default(),
        labels: doc.config.labels.unwrap_or_default(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Ports")]
    ports: String,
    #[serde(rename = "Labels")]
    labels: String,
}

fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

fn parse_ps_line(line: &str) -> Option<ContainerSummary> {
    let row: PsRow = serde_json::from_str(line).ok()?;
    let name = row.names.split(',').next().unwrap_or_default();
    Some(ContainerSummary {
        id: row.id,
        name: name.trim_start_matches('/').to_string(),
        image: row.image,
        state: row.state,
        ports: row.ports,
        labels: parse_labels(&row.labels),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImageRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Repository")]
    repository: String,
    #[serde(rename = "Tag")]
    tag: String,
}

fn parse_image_line(line: &str) -> Option<ImageSummary> {
    let row: ImageRow = serde_json::from_str(line).ok()?;
    let tags = if row.repository.is_empty() || row.repository == "<none>" || row.tag == "<none>" {
        Vec::new()
    } else {
        vec![format!("{}:{}", row.repository, row.tag)]
    };
    Some(ImageSummary { id: row.id, tags })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventRow {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Actor")]
    actor: EventActor,
    id: String,
    time: i64,
    #[serde(rename = "timeNano")]
    time_nano: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventActor {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Attributes")]
    attributes: BTreeMap<String, String>,
}

/// Parses one `docker events` JSON line into a container event.
fn parse_event(line: &str) -> Option<RuntimeEvent> {
    let row: EventRow = serde_json::from_str(line).ok()?;
    if !row.kind.is_empty() && row.kind != "container" {
        return None;
    }
    let action = row.action.split(':').next().unwrap_or_default().trim().to_string();
    if action.is_empty() {
        return None;
    }
    let time = if row.time_nano > 0 {
        Utc.timestamp_nanos(row.time_nano)
    } else {
        Utc.timestamp_opt(row.time, 0).single().unwrap_or_default()
    };
    let container_id = if row.actor.id.is_empty() { row.id } else { row.actor.id };
    Some(RuntimeEvent {
        action,
        container_id,
        container_name: row.actor.attributes.get("name").cloned(),
        time,
    })
}
