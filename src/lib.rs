//! # Search Ads 360 Sync Library
//!
//! A connector library for extracting reporting data from the Search Ads 360
//! asynchronous reporting API. Reports are generated server-side: the client
//! submits a report request, polls until the platform materializes it into
//! one or more downloadable CSV files, then streams and parses those files
//! into typed records with incremental watermark tracking.
//!
//! ## Features
//!
//! - **Asynchronous Report Jobs**: Submit/poll/fetch state machine per report
//! - **Resumable Sync**: Durable per-stream bookmarks with file-level resume,
//!   so an interrupted sync continues the same server-side job instead of
//!   resubmitting it
//! - **Incremental Replication**: Watermark-based filtering on a per-stream
//!   replication key, with full-table streams supported
//! - **Retry and Backoff**: Response classification (success / retryable /
//!   fatal) with bounded exponential backoff and token-refresh handling
//! - **Concurrent Streams**: Each stream syncs on its own task, sharing only
//!   the credential cache and the state store
//!
//! ## Architecture
//!
//! - [`registry`] - Report type registry with static stream metadata
//! - [`config`] - Connector configuration surface
//! - [`auth`] - OAuth2 token provider with single-flight refresh
//! - [`http`] - Authenticated request layer with retry classification
//! - [`report`] - Report request wire types and the job client
//! - [`extract`] - Result file download and CSV decoding
//! - [`schema`] - Stream schemas and record coercion
//! - [`state`] - Bookmark state with atomic persistence
//! - [`sink`] - Record emission protocol
//! - [`sync`] - Per-stream sync engine and concurrent runner
//! - [`shutdown`] - Graceful shutdown coordination
//!
//! ## Quick Start
//!
//! ```no_run
//! use searchads_sync::registry::ReportType;
//! use searchads_sync::config::ConnectorConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnectorConfig::load("config.json".as_ref())?;
//! let stream = ReportType::Keyword;
//! println!("{} keyed by {:?}", stream, stream.key_properties());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde_json::Value;
use std::collections::BTreeMap;

/// OAuth2 token acquisition and caching
pub mod auth;

/// CLI command implementations
pub mod cli;

/// Connector configuration surface
pub mod config;

/// Result file download and CSV decoding
pub mod extract;

/// Authenticated HTTP request layer
pub mod http;

/// Report type registry with stream metadata
pub mod registry;

/// Report request wire types and job client
pub mod report;

/// Stream schemas and record coercion
pub mod schema;

/// Graceful shutdown coordination shared across stream tasks
pub mod shutdown;

/// Record and state emission protocol
pub mod sink;

/// Bookmark state with atomic persistence
pub mod state;

/// Per-stream sync engine and concurrent runner
pub mod sync;

// Re-export commonly used types
pub use registry::ReportType;
pub use state::StreamBookmark;

/// One decoded row of one report file: column name to value.
///
/// Values are raw strings as decoded from the file, with empty and
/// null-marker cells normalized to [`Value::Null`]. Schema-aware type
/// coercion happens at emission time via [`schema::SchemaCoercer`].
pub type Record = BTreeMap<String, Value>;
