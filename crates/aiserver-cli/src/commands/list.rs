//! `aisrv list`: List every module with its status.

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if output fails.
pub async fn execute(_args: ListArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    output::print_envelope(&api.list_modules().await)
}
