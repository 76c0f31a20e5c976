//! `aisrv bootstrap`: Create the shared network and volumes.

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `bootstrap` command.
#[derive(Args, Debug)]
pub struct BootstrapArgs {}

/// Executes the `bootstrap` command.
///
/// # Errors
///
/// Returns an error if output fails.
pub async fn execute(_args: BootstrapArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    output::print_envelope(&api.bootstrap().await)
}
