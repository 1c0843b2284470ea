//! Per-stream sync engine and concurrent runner
//!
//! One `sync` call drives a stream end to end: project the column set,
//! validate the date window, resolve the submit-or-resume plan, walk the
//! job's files in ordinal order with file-granular bookmark persistence,
//! filter records against the watermark, and finalize the new watermark.

use chrono::{Days, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ConnectorConfig, FilterConfig};
use crate::extract::{ExtractError, FileExtractor};
use crate::registry::{Replication, ReportType};
use crate::report::{
    ReportApi, ReportColumn, ReportError, ReportFilter, ReportRequest, ReportScope, TimeRange,
};
use crate::schema::{SchemaCoercer, StreamSchema};
use crate::shutdown::SharedShutdown;
use crate::sink::{RecordSink, SinkError};
use crate::state::{StateError, StateStore, StreamBookmark};
use crate::Record;

mod plan;
mod runner;

pub use plan::JobPlan;
pub use runner::{sync_streams, StreamOutcome};

/// Date-segment columns that are excluded when segmentation is off
const DATE_SEGMENT_COLUMNS: &[&str] = &[
    "date",
    "monthStart",
    "monthEnd",
    "quarterStart",
    "quarterEnd",
    "weekStart",
    "weekEnd",
];

/// Fully resolved configuration for one stream, built once at construction
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Report type backing this stream
    pub report_type: ReportType,
    /// Column schema for projection, coercion, and catalog emission
    pub schema: StreamSchema,
    /// Optional explicit column allow-list
    pub column_allow_list: Option<Vec<String>>,
    /// Configured report filters
    pub filters: Vec<FilterConfig>,
    /// Resolved replication method (configured override or registry default)
    pub replication: Replication,
    /// Whether date-segment columns are requested
    pub include_date_segments: bool,
    /// Report scope
    pub scope: ReportScope,
    /// Initial start date for a stream with no bookmark
    pub start_date: NaiveDate,
    /// Optional explicit end date
    pub end_date: Option<NaiveDate>,
    /// Currency mode
    pub statistics_currency: String,
    /// Per-file row cap
    pub max_rows_per_file: u64,
}

impl StreamConfig {
    /// Resolve one stream's configuration against the connector config
    pub fn resolve(
        report_type: ReportType,
        config: &ConnectorConfig,
    ) -> Result<Self, SyncError> {
        let name = report_type.name();
        let schema = report_type
            .schema()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let replication = match config.replication_keys.get(name) {
            Some(key) => Replication::Incremental { key: key.clone() },
            None => report_type.default_replication(),
        };

        Ok(Self {
            report_type,
            schema,
            column_allow_list: config.stream_columns.get(name).cloned(),
            filters: config.stream_filters.get(name).cloned().unwrap_or_default(),
            replication,
            include_date_segments: config.include_date_segments,
            scope: ReportScope {
                agency_id: config.agency_id.clone(),
                advertiser_id: config.advertiser_id.clone(),
                engine_account_id: config.engine_account_id.clone(),
            },
            start_date: config
                .start_date()
                .map_err(|e| SyncError::Config(e.to_string()))?,
            end_date: config
                .end_date()
                .map_err(|e| SyncError::Config(e.to_string()))?,
            statistics_currency: config.statistics_currency().to_string(),
            max_rows_per_file: config.max_rows_per_file(),
        })
    }

    /// Stream name as emitted to the sink
    pub fn name(&self) -> &'static str {
        self.report_type.name()
    }
}

/// Result of one successful stream sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Records emitted to the sink
    pub emitted: u64,
    /// Final persisted bookmark
    pub bookmark: StreamBookmark,
}

/// Orchestrates one stream's end-to-end sync
#[derive(Clone)]
pub struct SyncEngine {
    api: Arc<dyn ReportApi>,
    extractor: Arc<dyn FileExtractor>,
    sink: Arc<dyn RecordSink>,
    coercer: Arc<dyn SchemaCoercer>,
    state: Arc<StateStore>,
    shutdown: Option<SharedShutdown>,
}

impl SyncEngine {
    /// Create an engine over its collaborators
    pub fn new(
        api: Arc<dyn ReportApi>,
        extractor: Arc<dyn FileExtractor>,
        sink: Arc<dyn RecordSink>,
        coercer: Arc<dyn SchemaCoercer>,
        state: Arc<StateStore>,
        shutdown: Option<SharedShutdown>,
    ) -> Self {
        Self {
            api,
            extractor,
            sink,
            coercer,
            state,
            shutdown,
        }
    }

    /// Announce a stream's schema and key properties to the sink
    pub fn announce(&self, stream: &StreamConfig) -> Result<(), SyncError> {
        self.sink.emit_schema(
            stream.name(),
            stream.schema.as_value(),
            &stream.report_type.key_properties(),
        )?;
        Ok(())
    }

    /// Sync one stream: returns the emitted count and the final bookmark.
    ///
    /// Configuration and date-window defects surface before any network
    /// call. Network failures surface after the HTTP layer's retry budget,
    /// leaving the bookmark at its last persisted position.
    pub async fn sync(&self, stream: &StreamConfig) -> Result<SyncSummary, SyncError> {
        let name = stream.name();
        info!(stream = name, "Syncing stream");

        // Step 1: column projection.
        let columns = project_columns(stream)?;

        // Step 2: date-range validation against the platform's one-day lag.
        let mut bookmark = self
            .state
            .bookmark(name)
            .await
            .unwrap_or_else(|| StreamBookmark::new(stream.start_date));
        let today = Utc::now().date_naive();
        let window = validate_window(stream, bookmark.date, today)?;

        // Step 3: submit-or-resume, resolved exactly once.
        let files = match JobPlan::resolve(&bookmark) {
            JobPlan::Resume { report_id } => {
                info!(stream = name, report_id, offset = bookmark.offset, "Resuming report job");
                let files = self.api.await_completion(&report_id).await?;
                if bookmark.file_count != Some(files.len()) {
                    bookmark.record_file_count(files.len());
                    self.state.update(name, bookmark.clone()).await?;
                }
                files
            }
            JobPlan::Submit => {
                let request = build_request(stream, columns, window)?;
                let report_id = self.api.submit(&request).await?;
                // Persist the id before any download so a crash after
                // submission resumes this job instead of resubmitting.
                bookmark.record_submission(report_id.clone());
                self.state.update(name, bookmark.clone()).await?;

                let files = self.api.await_completion(&report_id).await?;
                bookmark.record_file_count(files.len());
                self.state.update(name, bookmark.clone()).await?;
                files
            }
        };

        // Steps 4-5: ordinal file iteration with file-granular persistence.
        let mut new_watermark = bookmark.date;
        let mut emitted: u64 = 0;
        for descriptor in &files {
            if descriptor.ordinal < bookmark.offset {
                debug!(stream = name, ordinal = descriptor.ordinal, "Skipping processed file");
                continue;
            }
            if let Some(shutdown) = &self.shutdown {
                if shutdown.is_triggered() {
                    warn!(stream = name, "Shutdown requested, abandoning sync");
                    return Err(SyncError::Cancelled);
                }
            }

            let records = self.extractor.extract(&descriptor.url).await?;
            debug!(
                stream = name,
                ordinal = descriptor.ordinal,
                records = records.len(),
                "Processing result file"
            );
            for record in records {
                if self.emit_filtered(stream, record, bookmark.date, &mut new_watermark)? {
                    emitted += 1;
                }
            }

            bookmark.advance_file();
            self.state.update(name, bookmark.clone()).await?;
        }

        // Step 6: finalize the watermark.
        bookmark.date = new_watermark;
        self.state.update(name, bookmark.clone()).await?;
        info!(stream = name, emitted, watermark = %bookmark.date, "Stream synced");
        Ok(SyncSummary { emitted, bookmark })
    }

    /// Apply the incremental filter to one record and emit it if selected.
    ///
    /// The running watermark tracks the maximum observed key over every
    /// record, including ones below the emission threshold, so boundary
    /// rows sharing the old watermark date are never missed on the next
    /// run. Returns whether the record was emitted.
    fn emit_filtered(
        &self,
        stream: &StreamConfig,
        record: Record,
        old_watermark: NaiveDate,
        new_watermark: &mut NaiveDate,
    ) -> Result<bool, SyncError> {
        let emit = match &stream.replication {
            Replication::FullTable => true,
            Replication::Incremental { key } => {
                match record.get(key.as_str()).and_then(value_as_date) {
                    Some(date) => {
                        if date > *new_watermark {
                            *new_watermark = date;
                        }
                        date >= old_watermark
                    }
                    // Rows without a parseable key cannot advance the
                    // watermark but are still delivered.
                    None => true,
                }
            }
        };
        if emit {
            let coerced = self.coercer.coerce(&stream.schema, record);
            self.sink.emit(stream.name(), &coerced, Utc::now())?;
        }
        Ok(emit)
    }
}

/// Compute the selected column set for a stream.
///
/// Starts from the schema's columns, applies the optional allow-list, drops
/// date-segment columns when segmentation is off or unsupported, and
/// force-includes the replication key.
pub fn project_columns(stream: &StreamConfig) -> Result<Vec<String>, SyncError> {
    let replication_key = stream.replication.key();

    if let Some(key) = replication_key {
        if !stream.schema.has_column(key) {
            return Err(SyncError::Config(format!(
                "replication key {key:?} does not exist in the {} schema",
                stream.name()
            )));
        }
        if let Some(allow) = &stream.column_allow_list {
            if !allow.iter().any(|c| c == key) {
                return Err(SyncError::Config(format!(
                    "column allow-list for {} excludes the replication key {key:?}",
                    stream.name()
                )));
            }
        }
    }

    let segments_selected =
        stream.include_date_segments && stream.report_type.supports_date_segments();

    let mut columns: Vec<String> = stream
        .schema
        .column_names()
        .into_iter()
        .filter(|name| match &stream.column_allow_list {
            Some(allow) => allow.iter().any(|c| c == name),
            None => true,
        })
        .filter(|name| {
            if segments_selected {
                return true;
            }
            // The replication key survives segment exclusion.
            if replication_key == Some(*name) {
                return true;
            }
            !DATE_SEGMENT_COLUMNS.contains(name)
        })
        .map(str::to_string)
        .collect();

    if let Some(key) = replication_key {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.to_string());
        }
    }

    if columns.is_empty() {
        return Err(SyncError::Config(format!(
            "no columns selected for {}",
            stream.name()
        )));
    }
    Ok(columns)
}

/// Validate the effective date window and return it.
///
/// The platform does not reliably report on same-day or future data, so
/// without an explicit end date the start must be strictly earlier than
/// yesterday and the window ends yesterday.
pub fn validate_window(
    stream: &StreamConfig,
    start: NaiveDate,
    today: NaiveDate,
) -> Result<TimeRange, SyncError> {
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| SyncError::DateRange("date underflow computing yesterday".into()))?;

    match stream.end_date {
        Some(end) => {
            if start > end {
                return Err(SyncError::DateRange(format!(
                    "start date ({start}) is after configured end date ({end})"
                )));
            }
            Ok(TimeRange {
                start_date: start,
                end_date: end,
            })
        }
        None => {
            if start >= yesterday {
                return Err(SyncError::DateRange(format!(
                    "start date ({start}) must be strictly earlier than yesterday ({yesterday}); \
                     the platform lags one day"
                )));
            }
            Ok(TimeRange {
                start_date: start,
                end_date: yesterday,
            })
        }
    }
}

/// Build the report request for a fresh submission
fn build_request(
    stream: &StreamConfig,
    columns: Vec<String>,
    window: TimeRange,
) -> Result<ReportRequest, SyncError> {
    let filters = stream
        .filters
        .iter()
        .map(|f| ReportFilter {
            column: ReportColumn {
                column_name: f.column.clone(),
            },
            operator: f.operator.clone(),
            values: f.values.clone(),
        })
        .collect();
    ReportRequest::new(
        stream.report_type,
        stream.scope.clone(),
        columns,
        window,
        filters,
        stream.max_rows_per_file,
        stream.statistics_currency.clone(),
    )
    .map_err(SyncError::Config)
}

/// Replication-key cell value as a calendar date (timestamps truncate)
fn value_as_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?;
    let prefix = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Sync engine errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Bad or missing configuration; never retried
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid date window; never retried
    #[error("invalid date range: {0}")]
    DateRange(String),

    /// Sync abandoned on shutdown request
    #[error("sync cancelled by shutdown request")]
    Cancelled,

    /// Stream task aborted or panicked
    #[error("stream task failed: {0}")]
    Task(String),

    /// Report job failure
    #[error(transparent)]
    Report(#[from] ReportError),

    /// File extraction failure
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// State persistence failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Record emission failure
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> ConnectorConfig {
        serde_json::from_value(json!({
            "client_id": "cid",
            "client_secret": "secret",
            "refresh_token": "refresh",
            "agency_id": "1",
            "advertiser_id": "2",
            "engineAccount_id": "3",
            "start_date": "2024-01-01"
        }))
        .unwrap()
    }

    fn keyword_stream() -> StreamConfig {
        StreamConfig::resolve(ReportType::Keyword, &test_config()).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_projection_includes_schema_columns() {
        let stream = keyword_stream();
        let columns = project_columns(&stream).unwrap();
        assert!(columns.iter().any(|c| c == "keywordId"));
        assert!(columns.iter().any(|c| c == "date"));
    }

    #[test]
    fn test_projection_respects_allow_list() {
        let mut stream = keyword_stream();
        stream.column_allow_list = Some(vec!["keywordId".into(), "clicks".into(), "date".into()]);
        let columns = project_columns(&stream).unwrap();
        assert_eq!(columns.len(), 3);
        assert!(!columns.iter().any(|c| c == "status"));
    }

    #[test]
    fn test_projection_forces_replication_key_past_segment_exclusion() {
        let mut stream = keyword_stream();
        stream.include_date_segments = false;
        let columns = project_columns(&stream).unwrap();
        assert!(columns.iter().any(|c| c == "date"));
        // Only the key survives; a full-table stream would drop it too.
        stream.replication = Replication::FullTable;
        let columns = project_columns(&stream).unwrap();
        assert!(!columns.iter().any(|c| c == "date"));
    }

    #[test]
    fn test_projection_rejects_unknown_replication_key() {
        let mut stream = keyword_stream();
        stream.replication = Replication::Incremental {
            key: "noSuchColumn".into(),
        };
        assert!(matches!(
            project_columns(&stream),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_projection_rejects_allow_list_excluding_key() {
        let mut stream = keyword_stream();
        stream.column_allow_list = Some(vec!["keywordId".into(), "clicks".into()]);
        assert!(matches!(
            project_columns(&stream),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_window_without_end_date_ends_yesterday() {
        let stream = keyword_stream();
        let today = date(2024, 2, 1);
        let window = validate_window(&stream, date(2024, 1, 1), today).unwrap();
        assert_eq!(window.start_date, date(2024, 1, 1));
        assert_eq!(window.end_date, date(2024, 1, 31));
    }

    #[test]
    fn test_window_rejects_start_at_or_after_yesterday() {
        let stream = keyword_stream();
        let today = date(2024, 2, 1);
        assert!(validate_window(&stream, date(2024, 1, 31), today).is_err());
        assert!(validate_window(&stream, date(2024, 2, 5), today).is_err());
        assert!(validate_window(&stream, date(2024, 1, 30), today).is_ok());
    }

    #[test]
    fn test_window_with_explicit_end_date() {
        let mut stream = keyword_stream();
        stream.end_date = Some(date(2024, 1, 15));
        let today = date(2024, 2, 1);
        let window = validate_window(&stream, date(2024, 1, 1), today).unwrap();
        assert_eq!(window.end_date, date(2024, 1, 15));
        assert!(validate_window(&stream, date(2024, 1, 16), today).is_err());
    }

    #[test]
    fn test_value_as_date() {
        assert_eq!(
            value_as_date(&json!("2024-01-02")),
            Some(date(2024, 1, 2))
        );
        assert_eq!(
            value_as_date(&json!("2024-01-02T10:30:00Z")),
            Some(date(2024, 1, 2))
        );
        assert_eq!(value_as_date(&json!("garbage")), None);
        assert_eq!(value_as_date(&Value::Null), None);
    }

    #[test]
    fn test_replication_override_applies() {
        let mut config = test_config();
        config
            .replication_keys
            .insert("feedItem".into(), "feedItemId".into());
        let stream = StreamConfig::resolve(ReportType::FeedItem, &config).unwrap();
        assert_eq!(stream.replication.key(), Some("feedItemId"));
    }
}
