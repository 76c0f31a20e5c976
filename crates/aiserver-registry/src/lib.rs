//! # aiserver-registry
//!
//! The module catalog: schema types, discovery and merging of catalog files,
//! validation with cycle detection, dependency chain resolution, container
//! naming, and template materialization into concrete manifests.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod graph;
pub mod loader;
pub mod manifest;
pub mod naming;
pub mod registry;
pub mod schema;
pub mod template;
pub mod validator;

pub use manifest::{PortBinding, ResolvedManifest, VolumeBind};
pub use registry::{Registry, RegistryCache};
pub use schema::{HealthCheck, HealthKind, ModuleSchema};
pub use template::Materializer;
