//! The orchestration engine: start and stop state machines over a
//! dependency chain, status queries, and companion starts.
//!
//! A start request runs as a sequential pipeline:
//!
//! ```text
//! bootstrap → lookup → cycle check → materialize chain → port preflight
//!   → for each dependency: ensure → wait healthy
//!   → ensure target → wait healthy → post-start diagnostics
//!   → spawn companions
//! ```
//!
//! Duplicate starts for a module already in flight wait for that start and
//! share its outcome instead of running the pipeline again. Concurrent starts
//! of different modules whose chains overlap take per-module locks, in name
//! order, from the port preflight until the last member is up; the later
//! start then observes the shared members already running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use aiserver_common::config::GlobalConfig;
use aiserver_common::error::{ErrorCode, OrchestratorError, Result};
use aiserver_common::types::{ModuleStatus, ModuleType};
use aiserver_registry::{Materializer, ModuleSchema, Registry, RegistryCache, ResolvedManifest, naming};
use aiserver_runtime::{ContainerRuntime, ObservationCache};
use serde::Serialize;
use tokio::sync::{OwnedMutexGuard, broadcast, watch};

use crate::bootstrap::{self, BootstrapReport};
use crate::health::HealthProber;
use crate::logs::{self, LogEntry};
use crate::reconciler::{EnsureOutcome, Reconciler};
use crate::resolver;
use crate::status::{self, StatusCache};

/// Per-module result of a start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Module brought up.
    pub module: String,
    /// What the reconciler did.
    pub outcome: EnsureOutcome,
    /// Whether the health check passed.
    pub healthy: bool,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReport {
    /// Requested module.
    pub module: String,
    /// Dependencies then target, in the order they were brought up.
    pub steps: Vec<StepReport>,
    /// Companion modules started in the background.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub companions: Vec<String>,
}

/// Result of a successful stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    /// Module requested.
    pub module: String,
    /// Containers stopped for the module itself.
    pub stopped: Vec<String>,
    /// Unused basic dependencies stopped afterwards.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reclaimed: Vec<String>,
}

/// A module with its current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    /// Module name.
    pub name: String,
    /// Module role.
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    /// Direct dependencies.
    pub depends_on: Vec<String>,
    /// Current aggregate status.
    pub status: ModuleStatus,
}

/// Outcome of a background companion start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionReport {
    /// Module whose start spawned the companion.
    pub parent: String,
    /// Companion module.
    pub module: String,
    /// Whether the companion started.
    pub success: bool,
    /// Failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

type SharedOutcome = std::result::Result<StartReport, (ErrorCode, String)>;
type InFlightMap = Mutex<HashMap<String, watch::Receiver<Option<SharedOutcome>>>>;
type MemberLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Removes the in-flight entry when the owning start finishes or is dropped.
struct InFlightGuard<'a> {
    map: &'a InFlightMap,
    module: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.module);
    }
}

enum Slot {
    Owner(watch::Sender<Option<SharedOutcome>>),
    Joined(watch::Receiver<Option<SharedOutcome>>),
}

/// Module orchestration engine.
///
/// Owns every cache it uses, so independent engines can coexist in one
/// process. Share it behind an [`Arc`].
pub struct Engine {
    config: GlobalConfig,
    registry: RegistryCache,
    materializer: Materializer,
    runtime: Arc<dyn ContainerRuntime>,
    observations: ObservationCache,
    statuses: StatusCache,
    reconciler: Reconciler,
    prober: HealthProber,
    in_flight: InFlightMap,
    member_locks: MemberLocks,
    companions: broadcast::Sender<CompanionReport>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over the configured catalog and the process
    /// environment.
    #[must_use]
    pub fn new(config: GlobalConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let registry = RegistryCache::new(config.catalog.clone());
        let materializer = Materializer::from_process_env(&config);
        Self::from_parts(config, registry, materializer, runtime)
    }

    /// Creates an engine from explicit parts.
    #[must_use]
    pub fn from_parts(
        config: GlobalConfig,
        registry: RegistryCache,
        materializer: Materializer,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let reconciler = Reconciler::new(
            Arc::clone(&runtime),
            config.registry_mirrors.clone(),
            config.pull_retries,
            Some(config.network.name.clone()),
        );
        let (companions, _) = broadcast::channel(64);
        Self {
            observations: ObservationCache::new(Arc::clone(&runtime), config.observation_ttl()),
            statuses: StatusCache::new(config.status_ttl()),
            prober: HealthProber::new(Arc::clone(&runtime)),
            reconciler,
            registry,
            materializer,
            runtime,
            in_flight: Mutex::new(HashMap::new()),
            member_locks: Mutex::new(HashMap::new()),
            companions,
            config,
        }
    }

    /// Replaces the reconciler, e.g. to shorten pull backoff.
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Container runtime the engine drives.
    #[must_use]
    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    /// The current registry, loading it on first use.
    ///
    /// # Errors
    ///
    /// Propagates catalog loading errors.
    pub fn registry(&self) -> Result<Arc<Registry>> {
        self.registry.get()
    }

    /// Drops the cached registry after a catalog or configuration change.
    pub fn reload_registry(&self) {
        self.registry.invalidate();
        self.statuses.clear();
    }

    /// Subscribes to background companion outcomes.
    #[must_use]
    pub fn subscribe_companions(&self) -> broadcast::Receiver<CompanionReport> {
        self.companions.subscribe()
    }

    /// Ensures the shared network and volumes exist.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Runtime`] or [`OrchestratorError::Preflight`].
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        bootstrap::ensure_resources(self.runtime.as_ref(), &self.config).await
    }

    /// Starts `name` and everything it depends on.
    ///
    /// # Errors
    ///
    /// Any error of the start pipeline, carrying its stable code. A caller
    /// that joined an in-flight start receives
    /// [`OrchestratorError::Shared`] with the original code.
    pub async fn start_module(self: &Arc<Self>, name: &str) -> Result<StartReport> {
        self.start_guarded(name, true).await
    }

    async fn start_guarded(self: &Arc<Self>, name: &str, with_companions: bool) -> Result<StartReport> {
        let slot = {
            let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(rx) = map.get(name) {
                Slot::Joined(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                let _ = map.insert(name.to_string(), rx);
                Slot::Owner(tx)
            }
        };

        match slot {
            Slot::Joined(rx) => self.join_in_flight(name, rx).await,
            Slot::Owner(tx) => {
                let _guard = InFlightGuard {
                    map: &self.in_flight,
                    module: name.to_string(),
                };
                let result = self.run_start(name, with_companions).await;
                let shared = match &result {
                    Ok(report) => Ok(report.clone()),
                    Err(e) => Err((e.code(), e.to_string())),
                };
                let _ = tx.send(Some(shared));
                result
            }
        }
    }

    async fn join_in_flight(
        &self,
        name: &str,
        mut rx: watch::Receiver<Option<SharedOutcome>>,
    ) -> Result<StartReport> {
        tracing::info!(module = %name, "start already in flight; waiting for it");
        let outcome = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
        match outcome {
            Ok(Some(Ok(report))) => Ok(report),
            Ok(Some(Err((code, message)))) => Err(OrchestratorError::Shared {
                module: name.to_string(),
                code,
                message,
            }),
            Ok(None) | Err(_) => Err(OrchestratorError::Shared {
                module: name.to_string(),
                code: ErrorCode::Runtime,
                message: "in-flight start was abandoned".into(),
            }),
        }
    }

    fn is_lenient(&self, schema: &ModuleSchema) -> bool {
        schema.is_lenient() || self.config.lenient_modules.iter().any(|m| *m == schema.name)
    }

    async fn run_start(self: &Arc<Self>, name: &str, with_companions: bool) -> Result<StartReport> {
        let _ = self.bootstrap().await?;
        let registry = self.registry.get()?;
        let target = registry.require(name)?;
        registry.graph().ensure_acyclic_from(name)?;
        let chain = resolver::resolve_chain(&registry, name)?;
        tracing::info!(module = %name, chain = ?chain, "starting module");

        let mut members: Vec<&ModuleSchema> = chain
            .iter()
            .map(|dep| registry.require(dep))
            .collect::<Result<_>>()?;
        members.push(target);
        let manifests: Vec<ResolvedManifest> = members
            .iter()
            .map(|schema| self.materializer.materialize(schema))
            .collect::<Result<_>>()?;

        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        let _held = self.lock_members(&names).await;

        self.observations.invalidate();
        let snapshot = self.observations.snapshot().await?;
        resolver::check_ports(&manifests, &snapshot, self.config.port_probe_timeout()).await?;

        let mut steps = Vec::with_capacity(manifests.len());
        for (schema, manifest) in members.iter().zip(&manifests) {
            let step = self.bring_up(schema, manifest).await;
            self.observations.invalidate();
            steps.push(step?);
        }
        self.statuses.clear();

        let companions = if with_companions {
            for companion in &target.companions {
                self.spawn_companion(name, companion);
            }
            target.companions.clone()
        } else {
            Vec::new()
        };
        tracing::info!(module = %name, "module started");
        Ok(StartReport {
            module: name.to_string(),
            steps,
            companions,
        })
    }

    /// Locks every named module in name order; guards release on drop.
    async fn lock_members(&self, names: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted = names.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let locks: Vec<Arc<tokio::sync::Mutex<()>>> = {
            let mut map = self.member_locks.lock().unwrap_or_else(PoisonError::into_inner);
            sorted
                .iter()
                .map(|name| Arc::clone(map.entry((*name).to_string()).or_default()))
                .collect()
        };
        let mut held = Vec::with_capacity(locks.len());
        for (name, lock) in sorted.iter().zip(locks) {
            let guard = match Arc::clone(&lock).try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(module = %name, "waiting for concurrent start of shared module");
                    lock.lock_owned().await
                }
            };
            held.push(guard);
        }
        held
    }

    async fn bring_up(&self, schema: &ModuleSchema, manifest: &ResolvedManifest) -> Result<StepReport> {
        let outcome = self.reconciler.ensure(manifest).await?;
        let healthy = self
            .prober
            .wait_healthy(&manifest.container_name, manifest.health_check.as_ref())
            .await;
        if !healthy {
            if !self.is_lenient(schema) {
                return Err(OrchestratorError::HealthTimeout {
                    module: schema.name.clone(),
                });
            }
            tracing::warn!(module = %schema.name, "health check failed; continuing because module is lenient");
        }
        if outcome != EnsureOutcome::Unchanged {
            self.post_start(schema, &manifest.container_name).await;
        }
        Ok(StepReport {
            module: schema.name.clone(),
            outcome,
            healthy,
        })
    }

    /// Runs post-start diagnostics; failures are logged only.
    async fn post_start(&self, schema: &ModuleSchema, container: &str) {
        for cmd in schema.post_start() {
            match self.runtime.exec(container, cmd).await {
                Ok(out) if out.exit_code == 0 => {
                    tracing::debug!(module = %schema.name, cmd = ?cmd, stdout = %out.stdout.trim(), "post-start check passed");
                }
                Ok(out) => {
                    tracing::warn!(
                        module = %schema.name,
                        cmd = ?cmd,
                        exit_code = out.exit_code,
                        stderr = %out.stderr.trim(),
                        "post-start check failed"
                    );
                }
                Err(e) => {
                    tracing::warn!(module = %schema.name, cmd = ?cmd, error = %e, "post-start check could not run");
                }
            }
        }
    }

    /// Starts a companion in the background; its outcome is logged and
    /// broadcast, never returned to the parent's caller.
    fn spawn_companion(self: &Arc<Self>, parent: &str, companion: &str) {
        let engine = Arc::clone(self);
        let parent = parent.to_string();
        let companion = companion.to_string();
        let _handle = tokio::spawn(async move {
            let result = engine.start_guarded(&companion, false).await;
            let report = match result {
                Ok(_) => {
                    tracing::info!(parent = %parent, module = %companion, "companion started");
                    CompanionReport {
                        parent,
                        module: companion,
                        success: true,
                        code: None,
                        message: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(parent = %parent, module = %companion, code = %e.code(), error = %e, "companion failed");
                    CompanionReport {
                        parent,
                        module: companion,
                        success: false,
                        code: Some(e.code()),
                        message: Some(e.to_string()),
                    }
                }
            };
            let _ = engine.companions.send(report);
        });
    }

    /// Stops `name`.
    ///
    /// A basic module with running feature dependents is refused. When
    /// `autoStopUnusedDeps` is set, stopping a feature module also stops basic
    /// dependencies nothing else uses.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::InUse`], [`OrchestratorError::NotFound`], or
    /// runtime errors.
    pub async fn stop_module(&self, name: &str) -> Result<StopReport> {
        let registry = self.registry.get()?;
        let schema = registry.require(name)?;
        self.observations.invalidate();
        let snapshot = self.observations.snapshot().await?;

        if schema.module_type == ModuleType::Basic {
            let users = status::used_by(&registry, name, &snapshot);
            if !users.is_empty() {
                tracing::warn!(module = %name, used_by = ?users, "refusing to stop module in use");
                return Err(OrchestratorError::InUse {
                    module: name.to_string(),
                    dependents: users,
                });
            }
        }

        let stopped = self.stop_containers(schema, &snapshot).await?;
        tracing::info!(module = %name, containers = ?stopped, "module stopped");

        let mut reclaimed = Vec::new();
        if schema.module_type == ModuleType::Feature && self.config.auto_stop_unused_deps {
            for dep in registry.resolve_chain(name)? {
                let Some(dep_schema) = registry.get(&dep) else {
                    continue;
                };
                if dep_schema.module_type != ModuleType::Basic {
                    continue;
                }
                self.observations.invalidate();
                let snapshot = self.observations.snapshot().await?;
                if !status::used_by(&registry, &dep, &snapshot).is_empty() {
                    continue;
                }
                if !self.stop_containers(dep_schema, &snapshot).await?.is_empty() {
                    tracing::info!(module = %dep, "stopped unused dependency");
                    reclaimed.push(dep);
                }
            }
        }

        self.observations.invalidate();
        self.statuses.clear();
        Ok(StopReport {
            module: name.to_string(),
            stopped,
            reclaimed,
        })
    }

    async fn stop_containers(
        &self,
        schema: &ModuleSchema,
        snapshot: &[aiserver_runtime::ContainerSummary],
    ) -> Result<Vec<String>> {
        let mut stopped = Vec::new();
        for container in naming::container_names(schema) {
            let running = snapshot.iter().any(|c| c.name == container && c.is_running());
            if running {
                self.runtime.stop_container(&container).await?;
                stopped.push(container);
            }
        }
        Ok(stopped)
    }

    /// Aggregate status of `name`, served from cache within the TTL.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] or runtime errors.
    pub async fn get_module_status(&self, name: &str) -> Result<ModuleStatus> {
        if let Some(status) = self.statuses.get(name) {
            return Ok(status);
        }
        self.refresh_status(name).await
    }

    /// Recomputes the status of `name`, bypassing the status cache.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] or runtime errors.
    pub async fn refresh_status(&self, name: &str) -> Result<ModuleStatus> {
        let registry = self.registry.get()?;
        let snapshot = self.observations.snapshot().await?;
        let status = status::compute_status(&registry, name, &snapshot)?;
        let _ = self.statuses.put(name, status.clone());
        Ok(status)
    }

    /// Drops cached container observations.
    pub fn invalidate_observations(&self) {
        self.observations.invalidate();
    }

    /// Every registered module with its status.
    ///
    /// # Errors
    ///
    /// Registry or runtime errors.
    pub async fn list_modules(&self) -> Result<Vec<ModuleSummary>> {
        let registry = self.registry.get()?;
        let snapshot = self.observations.snapshot().await?;
        registry
            .modules()
            .iter()
            .map(|schema| -> Result<ModuleSummary> {
                let status = status::compute_status(&registry, &schema.name, &snapshot)?;
                let _ = self.statuses.put(&schema.name, status.clone());
                Ok(ModuleSummary {
                    name: schema.name.clone(),
                    module_type: schema.module_type,
                    depends_on: schema.depends_on.clone(),
                    status,
                })
            })
            .collect()
    }

    /// Recent log lines from every existing container of `name`.
    ///
    /// Containers whose logs cannot be read are skipped.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] if the module is unknown or has no
    /// container.
    pub async fn module_logs(&self, name: &str, tail: usize) -> Result<Vec<LogEntry>> {
        let registry = self.registry.get()?;
        let schema = registry.require(name)?;
        let snapshot = self.observations.snapshot().await?;
        let containers: Vec<String> = naming::container_names(schema)
            .into_iter()
            .filter(|c| snapshot.iter().any(|s| s.name == *c))
            .collect();
        if containers.is_empty() {
            return Err(OrchestratorError::NotFound {
                kind: "container",
                id: naming::primary_container(schema),
            });
        }
        let mut entries = Vec::new();
        for container in containers {
            match self.runtime.logs(&container, tail).await {
                Ok(raw) => entries.extend(logs::parse(&raw, &container, name, schema.module_type)),
                Err(e) => tracing::warn!(module = %name, container = %container, error = %e, "failed to read logs"),
            }
        }
        logs::sort_newest_first(&mut entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aiserver_common::config::CatalogConfig;
    use aiserver_runtime::ContainerDetails;
    use aiserver_runtime::backend::fake::{FakeRuntime, RuntimeCall};

    use super::*;

    fn engine(runtime: &Arc<FakeRuntime>, modules: &str, config: GlobalConfig) -> Arc<Engine> {
        let modules: Vec<ModuleSchema> = serde_json::from_str(modules).expect("modules");
        let registry = RegistryCache::with_registry(CatalogConfig::default(), Registry::new(modules));
        let materializer = Materializer::new(Vec::<(String, String)>::new(), &config);
        Arc::new(Engine::from_parts(config, registry, materializer, runtime.clone()))
    }

    fn running(name: &str) -> ContainerDetails {
        ContainerDetails {
            id: format!("id-{name}"),
            name: name.into(),
            image: "img".into(),
            state: "running".into(),
            health: None,
            port_bindings: BTreeMap::new(),
            command: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    const MODULES: &str = r#"[
        {"name":"base","type":"basic","image":"img"},
        {"name":"app","type":"feature","image":"img","dependsOn":["base"],
         "lifecycle":{"postStart":[["check"]]}}
    ]"#;

    #[tokio::test]
    async fn starts_dependencies_before_target() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.add_image("img");
        let engine = engine(&runtime, MODULES, GlobalConfig::default());
        let report = engine.start_module("app").await.expect("start");
        let order: Vec<&str> = report.steps.iter().map(|s| s.module.as_str()).collect();
        assert_eq!(order, vec!["base", "app"]);
        let creates: Vec<RuntimeCall> = runtime
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RuntimeCall::Create(_)))
            .collect();
        assert_eq!(creates, vec![RuntimeCall::Create("ai-base".into()), RuntimeCall::Create("ai-app".into())]);
        assert!(runtime.calls().contains(&RuntimeCall::Exec("ai-app".into(), vec!["check".into()])));
        assert!(engine.get_module_status("app").await.expect("status").running);
    }

    #[tokio::test]
    async fn unknown_module_is_not_found() {
        let runtime = Arc::new(FakeRuntime::new());
        let engine = engine(&runtime, MODULES, GlobalConfig::default());
        let err = engine.start_module("ghost").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn stopping_feature_can_reclaim_unused_basics() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(running("ai-base"));
        runtime.put_container(running("ai-app"));
        let config = GlobalConfig {
            auto_stop_unused_deps: true,
            ..GlobalConfig::default()
        };
        let engine = engine(&runtime, MODULES, config);
        let report = engine.stop_module("app").await.expect("stop");
        assert_eq!(report.stopped, vec!["ai-app"]);
        assert_eq!(report.reclaimed, vec!["base"]);
        assert!(!runtime.container("ai-base").expect("base").is_running());
    }

    #[tokio::test]
    async fn stopping_feature_keeps_basics_by_default() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(running("ai-base"));
        runtime.put_container(running("ai-app"));
        let engine = engine(&runtime, MODULES, GlobalConfig::default());
        let report = engine.stop_module("app").await.expect("stop");
        assert!(report.reclaimed.is_empty());
        assert!(runtime.container("ai-base").expect("base").is_running());
    }

    #[tokio::test]
    async fn logs_cover_existing_containers() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(running("ai-base"));
        runtime.set_logs("ai-base", "2024-05-01T10:00:00Z ERROR disk full\n");
        let engine = engine(&runtime, MODULES, GlobalConfig::default());
        let entries = engine.module_logs("base", 50).await.expect("logs");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, logs::LogLevel::Error);
        let err = engine.module_logs("app", 50).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn list_reports_every_module() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.put_container(running("ai-base"));
        let engine = engine(&runtime, MODULES, GlobalConfig::default());
        let modules = engine.list_modules().await.expect("list");
        assert_eq!(modules.len(), 2);
        assert!(modules[0].status.running);
        assert_eq!(modules[1].depends_on, vec!["base"]);
    }
}
