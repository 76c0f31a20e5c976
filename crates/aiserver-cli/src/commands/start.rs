//! `aisrv start`: Start a module and its dependencies.

use std::time::Duration;

use aiserver_engine::OrchestrationApi;
use clap::Args;

use crate::output;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Module name.
    pub name: String,

    /// Exit without waiting for companion modules.
    #[arg(long)]
    pub no_wait_companions: bool,

    /// Seconds to wait for companion modules.
    #[arg(long, default_value_t = 300)]
    pub companion_timeout: u64,
}

/// Executes the `start` command.
///
/// Companions start in the background; unless told otherwise, the command
/// waits for their reports so the process does not exit under them.
///
/// # Errors
///
/// Returns an error if output fails.
pub async fn execute(args: StartArgs, api: &OrchestrationApi) -> anyhow::Result<bool> {
    let mut reports = api.engine().subscribe_companions();
    let envelope = api.start_module(&args.name).await;
    let success = output::print_envelope(&envelope)?;

    let companions = envelope.data.as_ref().map_or(0, |r| r.companions.len());
    if args.no_wait_companions || companions == 0 {
        return Ok(success);
    }
    let deadline = tokio::time::sleep(Duration::from_secs(args.companion_timeout));
    tokio::pin!(deadline);
    let mut pending = companions;
    while pending > 0 {
        tokio::select! {
            () = &mut deadline => {
                tracing::warn!(pending, "gave up waiting for companions");
                break;
            }
            report = reports.recv() => match report {
                Ok(report) if report.parent == args.name => {
                    output::print_line(&report)?;
                    pending -= 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "companion reports unavailable");
                    break;
                }
            },
        }
    }
    Ok(success)
}
