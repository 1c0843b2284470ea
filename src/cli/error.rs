//! CLI error types and conversions

use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::sink::SinkError;
use crate::state::StateError;
use crate::sync::SyncError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// State error
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    /// Sink error
    #[error("sink error: {0}")]
    SinkError(#[from] SinkError),

    /// Sync error
    #[error("sync error: {0}")]
    SyncError(#[from] SyncError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more streams failed
    #[error("{failed} of {total} streams failed")]
    StreamsFailed {
        /// Streams that ended in error
        failed: usize,
        /// Streams attempted
        total: usize,
    },
}
