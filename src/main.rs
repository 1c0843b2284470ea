//! Main entry point for the searchads-sync CLI

use clap::Parser;
use searchads_sync::cli::{Cli, Commands};
use searchads_sync::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with optional JSON formatting.
///
/// Diagnostics go to stderr; stdout is reserved for the message stream.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("searchads_sync=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received, finishing current file and saving state");
                shutdown.trigger();
            }
        }
    });

    let result: anyhow::Result<()> = match &cli.command {
        Commands::Discover(cmd) => cmd.execute().map_err(anyhow::Error::from),
        Commands::Sync(cmd) => cmd.execute(&cli, shutdown).await.map_err(anyhow::Error::from),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
