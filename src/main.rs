use clap::Parser;
use colored::*;
use plasticome::cli::{commands, Cli, Commands};
use plasticome::PlasticomeError;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // RUST_LOG wins, then PLASTICOME_LOG, then info
    let log_level = std::env::var("PLASTICOME_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);

        let exit_code = match e.downcast_ref::<PlasticomeError>() {
            Some(PlasticomeError::Config(_)) => 2,
            Some(PlasticomeError::Io(_)) => 3,
            Some(PlasticomeError::Parse(_))
            | Some(PlasticomeError::Validation(_))
            | Some(PlasticomeError::InputAcquisition(_)) => 4,
            Some(PlasticomeError::Database(_)) | Some(PlasticomeError::Tool(_)) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose > 0 {
        tracing::debug!(verbosity = cli.verbose, "verbose output requested");
    }
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args, config_path).await,
        Commands::Database(args) => commands::database::run(args, config_path).await,
        Commands::Stages(args) => commands::stages::run(args, config_path),
        Commands::Config(args) => commands::config::run(args, config_path),
    }
}
