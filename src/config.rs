//! Connector configuration surface
//!
//! Configuration is a single JSON document supplying credentials, the report
//! scope, the sync window, and optional per-stream overrides (column
//! allow-lists, filters, replication-key overrides).

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Default currency mode for report statistics
pub const DEFAULT_STATISTICS_CURRENCY: &str = "agency";

/// Default cap on rows per generated result file
pub const DEFAULT_MAX_ROWS_PER_FILE: u64 = 100_000_000;

/// Connector configuration as loaded from the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// OAuth2 refresh token
    pub refresh_token: String,

    /// Agency id of the report scope
    pub agency_id: String,
    /// Advertiser id of the report scope
    pub advertiser_id: String,
    /// Engine-account id of the report scope; optional, but required for
    /// every report type that is not scope-exempt
    #[serde(rename = "engineAccount_id")]
    pub engine_account_id: Option<String>,

    /// Initial sync start date (ISO date or timestamp; truncated to date)
    pub start_date: String,
    /// Optional explicit end date; when absent the window ends yesterday
    #[serde(default)]
    pub end_date: Option<String>,

    /// Streams to sync; all known streams when absent
    #[serde(default)]
    pub streams: Option<Vec<String>>,
    /// Per-stream column allow-lists
    #[serde(default)]
    pub stream_columns: HashMap<String, Vec<String>>,
    /// Per-stream report filters
    #[serde(default)]
    pub stream_filters: HashMap<String, Vec<FilterConfig>>,
    /// Per-stream replication-key overrides
    #[serde(default)]
    pub replication_keys: HashMap<String, String>,
    /// Whether date-segment columns are requested for streams that support
    /// them (the replication key is force-included regardless)
    #[serde(default = "default_true")]
    pub include_date_segments: bool,

    /// Currency mode for report statistics
    #[serde(default)]
    pub statistics_currency: Option<String>,
    /// Cap on rows per generated result file
    #[serde(default)]
    pub max_rows_per_file: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// One configured report filter
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Column the filter applies to
    pub column: String,
    /// Filter operator (e.g. `equals`, `greaterThan`)
    pub operator: String,
    /// Operand values
    pub values: Vec<Value>,
}

impl ConnectorConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config: ConnectorConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agency_id.is_empty() {
            return Err(ConfigError::Invalid("agency_id cannot be empty".into()));
        }
        if self.advertiser_id.is_empty() {
            return Err(ConfigError::Invalid("advertiser_id cannot be empty".into()));
        }
        parse_date_field("start_date", &self.start_date)?;
        if let Some(end) = &self.end_date {
            parse_date_field("end_date", end)?;
        }
        Ok(())
    }

    /// The configured start date, truncated to a calendar date
    pub fn start_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date_field("start_date", &self.start_date)
    }

    /// The configured end date, truncated to a calendar date
    pub fn end_date(&self) -> Result<Option<NaiveDate>, ConfigError> {
        self.end_date
            .as_deref()
            .map(|d| parse_date_field("end_date", d))
            .transpose()
    }

    /// Effective currency mode
    pub fn statistics_currency(&self) -> &str {
        self.statistics_currency
            .as_deref()
            .unwrap_or(DEFAULT_STATISTICS_CURRENCY)
    }

    /// Effective per-file row cap
    pub fn max_rows_per_file(&self) -> u64 {
        self.max_rows_per_file.unwrap_or(DEFAULT_MAX_ROWS_PER_FILE)
    }
}

/// Parse a `YYYY-MM-DD`-prefixed date field, accepting full timestamps by
/// truncating to the first ten characters
fn parse_date_field(field: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    let prefix = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map_err(|e| ConfigError::Invalid(format!("{field} {value:?} is not a date: {e}")))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config: {0}")]
    Io(String),

    /// Config file is not valid JSON for the expected shape
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A field value violates an invariant
    #[error("invalid config: {0}")]
    Invalid(String),
}
