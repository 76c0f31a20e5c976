//! CLI command definitions and dispatch.

pub mod bootstrap;
pub mod list;
pub mod logs;
pub mod start;
pub mod status;
pub mod stop;
pub mod validate;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aiserver_common::config::GlobalConfig;
use aiserver_engine::{Engine, OrchestrationApi};
use aiserver_runtime::ContainerRuntime;
use aiserver_runtime::backend::docker::DockerCli;
use anyhow::Context;
use clap::{Parser, Subcommand};

/// aisrv: install and supervise containerized AI modules.
#[derive(Parser, Debug)]
#[command(name = "aisrv", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the JSON configuration file.
    #[arg(long, global = true, env = aiserver_common::constants::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every module with its status.
    List(list::ListArgs),
    /// Start a module and its dependencies.
    Start(start::StartArgs),
    /// Stop a module.
    Stop(stop::StopArgs),
    /// Show a module's aggregate status.
    Status(status::StatusArgs),
    /// Validate the module catalog.
    Validate(validate::ValidateArgs),
    /// Create the shared network and volumes.
    Bootstrap(bootstrap::BootstrapArgs),
    /// Show recent log lines of a module.
    Logs(logs::LogsArgs),
    /// Stream status changes until interrupted.
    Watch(watch::WatchArgs),
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GlobalConfig> {
    let Some(path) = path else {
        return Ok(GlobalConfig::default());
    };
    GlobalConfig::load(path).with_context(|| format!("loading configuration from {}", path.display()))
}

fn api(config: GlobalConfig) -> OrchestrationApi {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(&config.runtime));
    OrchestrationApi::new(Arc::new(Engine::new(config, runtime)))
}

/// Dispatches the parsed CLI command to its handler.
///
/// Returns whether the command's envelope reported success.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or output fails.
pub async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(config = ?cli.config, "configuration loaded");
    let api = api(config);
    match cli.command {
        Command::List(args) => list::execute(args, &api).await,
        Command::Start(args) => start::execute(args, &api).await,
        Command::Stop(args) => stop::execute(args, &api).await,
        Command::Status(args) => status::execute(args, &api).await,
        Command::Validate(args) => validate::execute(args, &api),
        Command::Bootstrap(args) => bootstrap::execute(args, &api).await,
        Command::Logs(args) => logs::execute(args, &api).await,
        Command::Watch(args) => watch::execute(args, &api).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_logs_with_tail() {
        let cli = Cli::try_parse_from(["aisrv", "logs", "redis", "--tail", "50"]).expect("parse");
        match cli.command {
            Command::Logs(args) => {
                assert_eq!(args.name, "redis");
                assert_eq!(args.tail, 50);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/aisrv.json"))).expect("defaults");
        assert_eq!(config, GlobalConfig::default());
    }
}
