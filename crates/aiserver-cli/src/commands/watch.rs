//! `aisrv watch`: Stream status changes until interrupted.

use std::sync::Arc;

use aiserver_engine::{OrchestrationApi, StatusSynchronizer};
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::output;

/// Arguments for the `watch` command.
#[derive(Args, Debug)]
pub struct WatchArgs {}

/// Executes the `watch` command.
///
/// Prints one JSON line per status change until Ctrl-C.
///
/// # Errors
///
/// Returns an error if output fails or the synchronizer task panics.
pub async fn execute(_args: WatchArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    let sync = Arc::new(StatusSynchronizer::new(Arc::clone(api.engine())));
    let mut events = sync.subscribe();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let sync = Arc::clone(&sync);
        let shutdown = shutdown.clone();
        async move { sync.run(shutdown).await }
    });

    tracing::info!("watching module status; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => output::print_line(&event)?,
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "status events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    shutdown.cancel();
    handle.await?;
    Ok(true)
}
