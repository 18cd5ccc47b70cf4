use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod cli;
mod clock;
mod commands;
mod config;
mod models;
mod progress;
mod repository;
mod tracker;
mod utils;

use cli::{Cli, Commands};
use config::Config;

const LOG_FILE_NAME: &str = "vtask.log";

/// Logs to stderr, or to `log_dir/vtask.log` when configured.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;
    let _guard = init_tracing(&config)?;

    match cli.command {
        Commands::Watch(args) => commands::watch::execute(args, config).await,
        Commands::Status(args) => commands::status::execute(args, config).await,
        Commands::Complete(args) => commands::complete::execute(args, config).await,
        Commands::Cancel(args) => commands::cancel::execute(args, config).await,
    }
}
