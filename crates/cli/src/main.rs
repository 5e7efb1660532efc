use crate::{
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::{Commands, TargetArgs};
use connectors::file::json::store::JsonDirStore;
use engine_config::{
    report::summary::SyncSummary,
    settings::{
        loader::load_rule_set, sync::SyncSettings, validated::ValidatedRuleSet,
        validator::RuleSetValidator,
    },
};
use engine_runtime::execution::executor;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "tablesync",
    version = "0.1.0",
    about = "Rule-driven synchronization between spreadsheet-style tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match execute(cli.command, &shutdown).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code.as_i32());
}

async fn execute(command: Commands, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    match command {
        Commands::Validate { config, env } => {
            let env = EnvManager::new().with_env_file(env.env_file.as_deref())?;
            let rules = load_rules(&env.config_file(config.as_deref())?).await?;
            output::emit(&output::ValidationReport::from(&rules), None).await?;
            Ok(ExitCode::Success)
        }
        Commands::Plan { target, output } => {
            let env = EnvManager::new().with_env_file(target.env.env_file.as_deref())?;
            let settings = env.sync_settings(None)?.with_dry_run(true);
            let summary = run_pass(&env, &target, settings, shutdown).await?;
            output::emit_summary(&summary, output.as_deref()).await?;
            Ok(ExitCode::Success)
        }
        Commands::Sync {
            target,
            max_concurrent,
            output,
        } => {
            let env = EnvManager::new().with_env_file(target.env.env_file.as_deref())?;
            let settings = env.sync_settings(max_concurrent)?;
            let summary = run_pass(&env, &target, settings, shutdown).await?;
            output::emit_summary(&summary, output.as_deref()).await?;

            let code = ExitCode::from_summary(&summary);
            if code == ExitCode::Degraded {
                error!(
                    failed = summary.rows_failed,
                    attempted = summary.rows_attempted(),
                    "Sync pass degraded"
                );
            }
            Ok(code)
        }
    }
}

async fn load_rules(path: &Path) -> Result<ValidatedRuleSet, CliError> {
    info!("Loading rule set: {}", path.display());
    let doc = load_rule_set(path).await?;
    Ok(RuleSetValidator::new(&doc).validate()?)
}

async fn run_pass(
    env: &EnvManager,
    target: &TargetArgs,
    settings: SyncSettings,
    shutdown: &ShutdownCoordinator,
) -> Result<SyncSummary, CliError> {
    let rules = load_rules(&env.config_file(target.config.as_deref())?).await?;
    let data_dir = env.data_dir(target.data_dir.as_deref())?;
    info!(
        data_dir = %data_dir.display(),
        dry_run = settings.dry_run,
        max_concurrent = settings.max_concurrent,
        "Starting sync pass"
    );

    let store = Arc::new(JsonDirStore::new(data_dir));
    Ok(executor::run(store, &rules, settings, shutdown.cancel_token()).await?)
}
