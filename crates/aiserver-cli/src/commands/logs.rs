//! `aisrv logs`: Show recent log lines of a module.

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Module name.
    pub name: String,

    /// Lines to read per container.
    #[arg(long, default_value_t = 200)]
    pub tail: usize,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if output fails.
pub async fn execute(args: LogsArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    output::print_envelope(&api.module_logs(&args.name, args.tail).await)
}
