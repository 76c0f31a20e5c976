//! # aiserver-runtime
//!
//! Typed capability interface over a container runtime, the Docker CLI
//! implementation of it, and a short-TTL observation cache that bounds the
//! number of list calls under bursts.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod observe;

pub use backend::{
    ContainerDetails, ContainerRuntime, ContainerSummary, CreateSpec, EventFilter, EventStream,
    ExecOutput, ImageSummary, PortMapping, PullProgress, RuntimeEvent,
};
pub use observe::ObservationCache;
