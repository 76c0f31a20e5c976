//! Short-TTL cache over the runtime's container listing.
//!
//! Bursts of status queries share one `list_containers` call per TTL. Two
//! callers racing on an expired entry may both refresh; the later write wins.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aiserver_common::error::Result;
use tokio::time::Instant;

use crate::backend::{ContainerRuntime, ContainerSummary};

/// Point-in-time container listing.
pub type Snapshot = Arc<Vec<ContainerSummary>>;

/// Caches container listings for a fixed TTL.
pub struct ObservationCache {
    runtime: Arc<dyn ContainerRuntime>,
    ttl: Duration,
    slot: Mutex<Option<(Instant, Snapshot)>>,
}

impl std::fmt::Debug for ObservationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ObservationCache {
    /// Creates a cache over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, ttl: Duration) -> Self {
        Self {
            runtime,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Returns a listing no older than the TTL.
    ///
    /// # Errors
    ///
    /// Propagates runtime errors from a refresh.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        if let Some((at, snapshot)) = self.slot.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if at.elapsed() < self.ttl {
                tracing::debug!("observation cache hit");
                return Ok(Arc::clone(snapshot));
            }
        }
        let fresh: Snapshot = Arc::new(self.runtime.list_containers().await?);
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), Arc::clone(&fresh)));
        Ok(fresh)
    }

    /// Returns the named container from a fresh-enough listing.
    ///
    /// # Errors
    ///
    /// Propagates runtime errors from a refresh.
    pub async fn container(&self, name: &str) -> Result<Option<ContainerSummary>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.iter().find(|c| c.name == name).cloned())
    }

    /// Drops the cached listing; the next call refreshes.
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
