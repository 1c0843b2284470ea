//! CLI command implementations

pub mod discover;
pub mod error;
pub mod sync;

pub use discover::DiscoverCommand;
pub use error::CliError;
pub use sync::SyncCommand;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Search Ads 360 report sync connector
#[derive(Debug, Parser)]
#[command(name = "searchads-sync", version, about)]
pub struct Cli {
    /// Path to the JSON connector configuration
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the catalog of available streams as JSON
    Discover(DiscoverCommand),
    /// Sync configured streams, emitting records to stdout
    Sync(SyncCommand),
}
