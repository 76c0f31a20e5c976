//! `aisrv status`: Show a module's aggregate status.

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Module name.
    pub name: String,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if output fails.
pub async fn execute(args: StatusArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    output::print_envelope(&api.get_module_status(&args.name).await)
}
