//! `aisrv validate`: Validate the module catalog.

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {}

/// Executes the `validate` command.
///
/// # Errors
///
/// Returns an error if output fails.
pub fn execute(_args: ValidateArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    output::print_envelope(&api.validate())
}
