//! Unified error type and stable error codes for the orchestration workspace.
//!
//! Every failure that crosses the orchestration API is mapped to an
//! [`ErrorCode`] so the calling shell can branch on a stable identifier
//! rather than on message text.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The dependency graph contains a cycle reachable from a module.
    #[error("dependency cycle detected for {module}: {}", .path.join(" -> "))]
    DependencyCycle {
        /// Module whose dependency walk entered the cycle.
        module: String,
        /// Cycle path, starting and ending at the repeated node.
        path: Vec<String>,
    },

    /// A required host port is already bound by something else.
    #[error("port {bind}:{port} required by {module} is already in use")]
    PortConflict {
        /// Module declaring the binding.
        module: String,
        /// Host bind address.
        bind: String,
        /// Host port.
        port: u16,
    },

    /// A file-backed manifest template does not exist.
    #[error("template for {module} not found at {}", .path.display())]
    TemplateMissing {
        /// Module referencing the template.
        module: String,
        /// Resolved template path.
        path: PathBuf,
    },

    /// A materialized manifest value has the wrong shape.
    #[error("invalid manifest for {module}: {message}")]
    TemplateInvalid {
        /// Module being materialized.
        module: String,
        /// Description of the invalid value.
        message: String,
    },

    /// One or more template variables have neither a value nor a default.
    #[error("missing variables for {module}: {}", .names.join(", "))]
    VariablesMissing {
        /// Module being materialized.
        module: String,
        /// Every missing variable name, sorted.
        names: Vec<String>,
    },

    /// A module exhausted its health-check retries.
    #[error("health check for {module} timed out")]
    HealthTimeout {
        /// Module that never became healthy.
        module: String,
    },

    /// A shared module still has running dependents.
    #[error("{module} is in use by {}", .dependents.join(", "))]
    InUse {
        /// Module the caller tried to stop.
        module: String,
        /// Feature modules currently depending on it.
        dependents: Vec<String>,
    },

    /// The container runtime is unreachable or returned an unexpected error.
    #[error("runtime error during {operation}: {message}")]
    Runtime {
        /// Runtime operation that failed.
        operation: String,
        /// Runtime-provided detail.
        message: String,
    },

    /// An image could not be acquired from any candidate registry.
    #[error("failed to pull {image}: {message}")]
    ImagePull {
        /// Image reference of the last attempt.
        image: String,
        /// Error reported by the last attempt.
        message: String,
    },

    /// The shared network or a named volume could not be ensured.
    #[error("failed to prepare {resource}: {message}")]
    Preflight {
        /// Network or volume name.
        resource: String,
        /// Underlying failure.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The module registry failed validation.
    #[error("registry validation failed: {}", .issues.join("; "))]
    Validation {
        /// Human-readable issues.
        issues: Vec<String>,
    },

    /// A concurrent start of the same module failed; this caller shared it.
    #[error("start of {module} failed: {message}")]
    Shared {
        /// Module whose start was in flight.
        module: String,
        /// Code of the original failure.
        code: ErrorCode,
        /// Message of the original failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl OrchestratorError {
    /// Shorthand for a [`OrchestratorError::Runtime`] error.
    pub fn runtime(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the stable code surfaced to API callers.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DependencyCycle { .. } => ErrorCode::DepCycle,
            Self::PortConflict { .. } => ErrorCode::PortConflict,
            Self::TemplateMissing { .. } => ErrorCode::TemplateMissing,
            Self::TemplateInvalid { .. } => ErrorCode::TemplateInvalid,
            Self::VariablesMissing { .. } => ErrorCode::VarMissing,
            Self::HealthTimeout { .. } => ErrorCode::HealthTimeout,
            Self::InUse { .. } => ErrorCode::InUse,
            Self::Runtime { .. } | Self::Io { .. } | Self::Serialization { .. } => {
                ErrorCode::Runtime
            }
            Self::ImagePull { .. } => ErrorCode::ImagePull,
            Self::Preflight { .. } => ErrorCode::PreflightResource,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Validation { .. } | Self::Config { .. } => ErrorCode::Validation,
            Self::Shared { code, .. } => *code,
        }
    }
}

/// Stable error identifiers exposed through the result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Dependency cycle.
    #[serde(rename = "E_DEP_CYCLE")]
    DepCycle,
    /// Host port already bound.
    #[serde(rename = "E_PORT_CONFLICT")]
    PortConflict,
    /// Manifest template file missing.
    #[serde(rename = "E_TEMPLATE_MISSING")]
    TemplateMissing,
    /// Materialized manifest has an invalid value.
    #[serde(rename = "E_TEMPLATE_INVALID")]
    TemplateInvalid,
    /// Template variables unresolved.
    #[serde(rename = "E_VAR_MISSING")]
    VarMissing,
    /// Health retries exhausted.
    #[serde(rename = "E_HEALTH_TIMEOUT")]
    HealthTimeout,
    /// Stop refused because of running dependents.
    #[serde(rename = "E_IN_USE")]
    InUse,
    /// Container runtime failure.
    #[serde(rename = "E_RUNTIME")]
    Runtime,
    /// Image pull exhausted all candidates.
    #[serde(rename = "E_IMAGE_PULL")]
    ImagePull,
    /// Shared network or volume bootstrap failed.
    #[serde(rename = "E_PREFLIGHT_RESOURCE")]
    PreflightResource,
    /// Unknown module or resource.
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    /// Registry or configuration validation failed.
    #[serde(rename = "E_VALIDATION")]
    Validation,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DepCycle => "E_DEP_CYCLE",
            Self::PortConflict => "E_PORT_CONFLICT",
            Self::TemplateMissing => "E_TEMPLATE_MISSING",
            Self::TemplateInvalid => "E_TEMPLATE_INVALID",
            Self::VarMissing => "E_VAR_MISSING",
            Self::HealthTimeout => "E_HEALTH_TIMEOUT",
            Self::InUse => "E_IN_USE",
            Self::Runtime => "E_RUNTIME",
            Self::ImagePull => "E_IMAGE_PULL",
            Self::PreflightResource => "E_PREFLIGHT_RESOURCE",
            Self::NotFound => "E_NOT_FOUND",
            Self::Validation => "E_VALIDATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
