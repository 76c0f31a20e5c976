//! # aiserver-engine
//!
//! Module orchestration above a container runtime: dependency chain
//! expansion and port preflight, drift-aware reconciliation with mirror
//! fallback, health-gated readiness, usage-aware stops, and event-driven
//! status synchronization. [`api::OrchestrationApi`] wraps the engine in the
//! uniform result envelope the shell consumes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod api;
pub mod bootstrap;
pub mod health;
pub mod image;
pub mod logs;
pub mod reconciler;
pub mod resolver;
pub mod status;
pub mod sync;
pub mod workflow;

pub use api::{Envelope, OrchestrationApi};
pub use sync::{StatusEvent, StatusSynchronizer};
pub use workflow::{CompanionReport, Engine, ModuleSummary, StartReport, StopReport};
