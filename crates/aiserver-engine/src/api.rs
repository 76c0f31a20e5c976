//! The orchestration API exposed to the shell: every call returns a uniform
//! `{success, code?, message?, data?}` envelope.

use std::sync::Arc;

use aiserver_common::error::{ErrorCode, OrchestratorError, Result};
use aiserver_common::types::ModuleStatus;
use serde::Serialize;

use crate::bootstrap::BootstrapReport;
use crate::logs::LogEntry;
use crate::workflow::{Engine, ModuleSummary, StartReport, StopReport};

/// Uniform result envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Stable error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Human-readable failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Successful envelope carrying `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            code: None,
            message: None,
            data: Some(data),
        }
    }

    /// Failed envelope for `error`.
    pub fn error(error: &OrchestratorError) -> Self {
        Self {
            success: false,
            code: Some(error.code()),
            message: Some(error.to_string()),
            data: None,
        }
    }
}

impl<T> From<Result<T>> for Envelope<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                tracing::debug!(code = %e.code(), error = %e, "call failed");
                Self::error(&e)
            }
        }
    }
}

/// Outcome of a registry validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Number of registered modules.
    pub modules: usize,
}

/// Envelope-returning facade over [`Engine`].
#[derive(Debug, Clone)]
pub struct OrchestrationApi {
    engine: Arc<Engine>,
}

impl OrchestrationApi {
    /// Wraps an engine.
    #[must_use]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// `StartModule(name)`.
    pub async fn start_module(&self, name: &str) -> Envelope<StartReport> {
        self.engine.start_module(name).await.into()
    }

    /// `StopModule(name)`.
    pub async fn stop_module(&self, name: &str) -> Envelope<StopReport> {
        self.engine.stop_module(name).await.into()
    }

    /// `GetModuleStatus(name)`.
    pub async fn get_module_status(&self, name: &str) -> Envelope<ModuleStatus> {
        self.engine.get_module_status(name).await.into()
    }

    /// `ListModules()`.
    pub async fn list_modules(&self) -> Envelope<Vec<ModuleSummary>> {
        self.engine.list_modules().await.into()
    }

    /// Ensures the shared network and volumes exist.
    pub async fn bootstrap(&self) -> Envelope<BootstrapReport> {
        self.engine.bootstrap().await.into()
    }

    /// Recent log lines of a module.
    pub async fn module_logs(&self, name: &str, tail: usize) -> Envelope<Vec<LogEntry>> {
        self.engine.module_logs(name, tail).await.into()
    }

    /// Reloads and validates the registry.
    pub fn validate(&self) -> Envelope<ValidationReport> {
        self.engine.reload_registry();
        let result = self.engine.registry().and_then(|registry| {
            let issues = registry.validate();
            if issues.is_empty() {
                Ok(ValidationReport {
                    modules: registry.modules().len(),
                })
            } else {
                Err(OrchestratorError::Validation { issues })
            }
        });
        result.into()
    }
}
