//! `aisrv stop`: Stop a module.

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Module name.
    pub name: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if output fails.
pub async fn execute(args: StopArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    tracing::info!(module = %args.name, "stopping module");
    output::print_envelope(&api.stop_module(&args.name).await)
}
