//! Event-driven status synchronization.
//!
//! Runtime lifecycle events are mapped to module names and coalesced into a
//! pending set. A fixed-interval ticker drains the set, refreshing each
//! module's status one after another, and broadcasts only statuses that
//! changed. A dropped or failed subscription is retried after a delay.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use aiserver_common::constants::INTERESTING_EVENT_ACTIONS;
use aiserver_common::error::Result;
use aiserver_common::types::ModuleStatus;
use aiserver_registry::naming;
use aiserver_runtime::{EventFilter, EventStream, RuntimeEvent};
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::workflow::Engine;

/// A module whose aggregate status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// Module name.
    pub name: String,
    /// New status.
    pub status: ModuleStatus,
}

/// Keeps module status fresh from the runtime's event stream.
#[derive(Debug)]
pub struct StatusSynchronizer {
    engine: Arc<Engine>,
    events: broadcast::Sender<StatusEvent>,
    batch_interval: Duration,
    retry_delay: Duration,
}

/// Mutable state of one [`StatusSynchronizer::run`] call.
#[derive(Debug, Default)]
struct SyncState {
    pending: BTreeSet<String>,
    last: HashMap<String, ModuleStatus>,
}

impl StatusSynchronizer {
    /// Creates a synchronizer using the engine's sync settings.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        let sync = &engine.config().sync;
        let (batch_interval, retry_delay) = (sync.batch_interval(), sync.retry_delay());
        let (events, _) = broadcast::channel(256);
        Self {
            engine,
            events,
            batch_interval,
            retry_delay,
        }
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut state = SyncState::default();
        let mut ticker = tokio::time::interval(self.batch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match self.open_stream().await {
                Ok(stream) => {
                    tracing::info!("subscribed to runtime events");
                    if !self.pump(stream, &mut ticker, &mut state, &shutdown).await {
                        break;
                    }
                    tracing::warn!("runtime event stream ended");
                }
                Err(e) => tracing::warn!(error = %e, "event subscription failed"),
            }
            self.drain(&mut state).await;
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.retry_delay) => {
                    tracing::debug!("retrying event subscription");
                }
            }
        }

        state.pending.clear();
        state.last.clear();
        tracing::info!("status synchronizer stopped");
    }

    async fn open_stream(&self) -> Result<EventStream> {
        let filter = EventFilter {
            since: Utc::now(),
            actions: INTERESTING_EVENT_ACTIONS.iter().map(|a| (*a).to_string()).collect(),
        };
        self.engine.runtime().subscribe_events(&filter).await
    }

    /// Consumes `stream` until it ends (`true`) or shutdown (`false`).
    async fn pump(
        &self,
        mut stream: EventStream,
        ticker: &mut tokio::time::Interval,
        state: &mut SyncState,
        shutdown: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return false,
                _ = ticker.tick() => self.drain(state).await,
                item = stream.next() => match item {
                    Some(Ok(event)) => self.enqueue(&event, state).await,
                    Some(Err(e)) => tracing::warn!(error = %e, "bad runtime event"),
                    None => return true,
                },
            }
        }
    }

    async fn enqueue(&self, event: &RuntimeEvent, state: &mut SyncState) {
        let Some(container) = self.container_name(event).await else {
            tracing::debug!(id = %event.container_id, "dropping event for unknown container");
            return;
        };
        let modules = match self.engine.registry() {
            Ok(registry) => registry.modules_for_container(&container),
            Err(e) => {
                tracing::warn!(error = %e, "registry unavailable; dropping event");
                return;
            }
        };
        if modules.is_empty() {
            tracing::debug!(container = %container, "event for unmanaged container");
        }
        for module in modules {
            tracing::debug!(module = %module, action = %event.action, "status refresh queued");
            let _ = state.pending.insert(module);
        }
    }

    async fn container_name(&self, event: &RuntimeEvent) -> Option<String> {
        if let Some(name) = &event.container_name {
            return Some(naming::normalize_container_name(name).to_string());
        }
        match self.engine.runtime().inspect_container(&event.container_id).await {
            Ok(details) => details.map(|d| naming::normalize_container_name(&d.name).to_string()),
            Err(e) => {
                tracing::debug!(id = %event.container_id, error = %e, "inspect failed for event");
                None
            }
        }
    }

    /// Refreshes every pending module serially and broadcasts changes.
    async fn drain(&self, state: &mut SyncState) {
        if state.pending.is_empty() {
            return;
        }
        self.engine.invalidate_observations();
        for module in std::mem::take(&mut state.pending) {
            match self.engine.refresh_status(&module).await {
                Ok(status) => {
                    if state.last.get(&module) == Some(&status) {
                        continue;
                    }
                    tracing::info!(module = %module, status = %status.status, "module status changed");
                    let _ = state.last.insert(module.clone(), status.clone());
                    let _ = self.events.send(StatusEvent { name: module, status });
                }
                Err(e) => tracing::warn!(module = %module, error = %e, "status refresh failed"),
            }
        }
    }
}
