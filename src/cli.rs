use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{cancel, complete, status, watch};

#[derive(Parser)]
#[command(name = "vtask")]
#[command(about = "Track and resolve timed vault tasks against the game backend")]
#[command(version)]
pub struct Cli {
    /// Path to config file (defaults to VTASK_CONFIG or the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Track tasks live and complete them as they finish
    Watch(watch::Args),

    /// Print the current progress of every active task
    Status(status::Args),

    /// Complete a finished task
    Complete(complete::Args),

    /// Cancel an active task, keeping any partial reward
    Cancel(cancel::Args),
}
