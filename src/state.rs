//! Bookmark state with atomic persistence
//!
//! The per-stream [`StreamBookmark`] is the sole durable recovery point: it
//! carries the incremental watermark plus the in-flight report job id, file
//! count, and next-file offset. State is persisted after every bookmark
//! mutation with atomic temp-file writes and file locking.

use chrono::NaiveDate;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum allowed state file size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Per-stream watermark and resume position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBookmark {
    /// Incremental watermark: the last fully covered calendar date
    pub date: NaiveDate,
    /// Server-assigned id of the in-flight or last-used report job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    /// Total file count of that job, once observed ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    /// Ordinal of the next file to process
    #[serde(default)]
    pub offset: usize,
}

impl StreamBookmark {
    /// Fresh bookmark at a start date, no job in flight
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            report_id: None,
            file_count: None,
            offset: 0,
        }
    }

    /// Validate bookmark invariants
    pub fn validate(&self) -> Result<(), String> {
        if let Some(count) = self.file_count {
            if self.offset > count {
                return Err(format!(
                    "offset ({}) exceeds file count ({count})",
                    self.offset
                ));
            }
            if self.report_id.is_none() {
                return Err("file count recorded without a report id".to_string());
            }
        }
        Ok(())
    }

    /// Record a newly submitted job, resetting resume position.
    ///
    /// The file count stays unknown until the job is first observed ready;
    /// persisting the id immediately means a crash between submission and
    /// readiness still resumes polling the same job.
    pub fn record_submission(&mut self, report_id: String) {
        self.report_id = Some(report_id);
        self.file_count = None;
        self.offset = 0;
    }

    /// Record the stable file count of a ready job
    pub fn record_file_count(&mut self, count: usize) {
        self.file_count = Some(count);
    }

    /// Advance past one fully processed file
    pub fn advance_file(&mut self) {
        self.offset += 1;
    }
}

/// Full persisted state document: one bookmark per stream name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Bookmarks keyed by stream name
    #[serde(default)]
    pub bookmarks: HashMap<String, StreamBookmark>,
}

impl State {
    /// Bookmark for a stream, if one is persisted
    pub fn bookmark(&self, stream: &str) -> Option<&StreamBookmark> {
        self.bookmarks.get(stream)
    }

    /// Replace a stream's bookmark
    pub fn set_bookmark(&mut self, stream: impl Into<String>, bookmark: StreamBookmark) {
        self.bookmarks.insert(stream.into(), bookmark);
    }
}

/// Receives the full state document after every bookmark mutation
pub trait StateSink: Send + Sync {
    /// Persist or forward the full state
    fn persist(&self, state: &State) -> Result<(), StateError>;
}

impl<T: StateSink + ?Sized> StateSink for Arc<T> {
    fn persist(&self, state: &State) -> Result<(), StateError> {
        (**self).persist(state)
    }
}

/// File-backed state sink with atomic writes and file locking.
///
/// Writes go to a temp file in the target directory, are fsynced, then
/// atomically renamed over the target; the parent directory is fsynced so
/// the rename is durable. A sibling `.lock` file coordinates concurrent
/// processes.
pub struct FileStateSink {
    path: PathBuf,
}

impl FileStateSink {
    /// Create a sink writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load state from the sink's path; a missing file yields empty state
    pub fn load(&self) -> Result<State, StateError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No state file, starting empty");
            return Ok(State::default());
        }

        let lock_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StateError::Lock(format!("failed to create lock file: {e}")))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| StateError::Lock(format!("failed to acquire read lock: {e}")))?;

        let metadata =
            std::fs::metadata(&self.path).map_err(|e| StateError::Io(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StateError::TooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| StateError::Io(e.to_string()))?;
        let state: State = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize state");
            StateError::Deserialization(e.to_string())
        })?;
        for (stream, bookmark) in &state.bookmarks {
            bookmark
                .validate()
                .map_err(|e| StateError::Invalid(format!("{stream}: {e}")))?;
        }
        info!(
            path = %self.path.display(),
            streams = state.bookmarks.len(),
            "State loaded"
        );
        Ok(state)
    }
}

impl StateSink for FileStateSink {
    fn persist(&self, state: &State) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::Io(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let lock_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StateError::Lock(format!("failed to create lock file: {e}")))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| StateError::Lock(format!("failed to acquire write lock: {e}")))?;

        let parent_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| StateError::Io(format!("failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StateError::Io(format!("failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StateError::Io(format!("failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StateError::Io(format!("failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StateError::Io(format!("failed to persist temp file: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(path = %self.path.display(), "State persisted");
        Ok(())
    }
}

/// Shared state store: the sync engines' only bookmark writer interface.
///
/// Holds the state document behind an async mutex (streams sync
/// concurrently but persist independently) and forwards every mutation to
/// the registered sinks.
pub struct StateStore {
    state: tokio::sync::Mutex<State>,
    sinks: Vec<Box<dyn StateSink>>,
}

impl StateStore {
    /// Create a store over initial state and its sinks
    pub fn new(initial: State, sinks: Vec<Box<dyn StateSink>>) -> Self {
        Self {
            state: tokio::sync::Mutex::new(initial),
            sinks,
        }
    }

    /// Current bookmark for a stream, if any
    pub async fn bookmark(&self, stream: &str) -> Option<StreamBookmark> {
        self.state.lock().await.bookmark(stream).cloned()
    }

    /// Replace a stream's bookmark and persist the full state
    pub async fn update(
        &self,
        stream: &str,
        bookmark: StreamBookmark,
    ) -> Result<(), StateError> {
        bookmark
            .validate()
            .map_err(|e| StateError::Invalid(format!("{stream}: {e}")))?;
        let mut state = self.state.lock().await;
        state.set_bookmark(stream, bookmark);
        for sink in &self.sinks {
            sink.persist(&state)?;
        }
        Ok(())
    }

    /// Snapshot of the full state document
    pub async fn snapshot(&self) -> State {
        self.state.lock().await.clone()
    }
}

/// State persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// I/O failure
    #[error("state I/O error: {0}")]
    Io(String),

    /// Serialization failure
    #[error("state serialization error: {0}")]
    Serialization(String),

    /// Deserialization failure
    #[error("state deserialization error: {0}")]
    Deserialization(String),

    /// Lock acquisition failure
    #[error("state lock error: {0}")]
    Lock(String),

    /// State file exceeds the size guard
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    TooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Bookmark violates an invariant
    #[error("invalid bookmark: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bookmark_invariants() {
        let mut bookmark = StreamBookmark::new(date(2024, 1, 1));
        assert!(bookmark.validate().is_ok());

        bookmark.record_submission("J1".to_string());
        assert!(bookmark.validate().is_ok());
        assert_eq!(bookmark.offset, 0);

        bookmark.record_file_count(2);
        bookmark.advance_file();
        bookmark.advance_file();
        assert!(bookmark.validate().is_ok());

        bookmark.advance_file();
        assert!(bookmark.validate().is_err());
    }

    #[test]
    fn test_file_count_requires_report_id() {
        let bookmark = StreamBookmark {
            date: date(2024, 1, 1),
            report_id: None,
            file_count: Some(2),
            offset: 0,
        };
        assert!(bookmark.validate().is_err());
    }

    #[test]
    fn test_resubmission_resets_offset() {
        let mut bookmark = StreamBookmark {
            date: date(2024, 1, 1),
            report_id: Some("J1".to_string()),
            file_count: Some(3),
            offset: 3,
        };
        bookmark.record_submission("J2".to_string());
        assert_eq!(bookmark.report_id.as_deref(), Some("J2"));
        assert_eq!(bookmark.file_count, None);
        assert_eq!(bookmark.offset, 0);
    }

    #[test]
    fn test_file_sink_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let sink = FileStateSink::new(&path);

        let mut state = State::default();
        let mut bookmark = StreamBookmark::new(date(2024, 1, 3));
        bookmark.record_submission("J1".to_string());
        bookmark.record_file_count(2);
        bookmark.advance_file();
        state.set_bookmark("keyword", bookmark.clone());

        sink.persist(&state).unwrap();
        let loaded = sink.load().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.bookmark("keyword"), Some(&bookmark));
    }

    #[test]
    fn test_missing_state_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = FileStateSink::new(dir.path().join("absent.json"));
        assert_eq!(sink.load().unwrap(), State::default());
    }

    #[test]
    fn test_corrupt_bookmark_rejected_on_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"bookmarks": {"keyword": {"date": "2024-01-01", "file_count": 2, "offset": 5}}}"#,
        )
        .unwrap();
        let sink = FileStateSink::new(&path);
        assert!(sink.load().is_err());
    }

    #[tokio::test]
    async fn test_store_update_persists_to_sinks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::new(
            State::default(),
            vec![Box::new(FileStateSink::new(&path))],
        );

        let bookmark = StreamBookmark::new(date(2024, 1, 1));
        store.update("keyword", bookmark.clone()).await.unwrap();
        assert_eq!(store.bookmark("keyword").await, Some(bookmark.clone()));

        let reloaded = FileStateSink::new(&path).load().unwrap();
        assert_eq!(reloaded.bookmark("keyword"), Some(&bookmark));
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_bookmark() {
        let store = StateStore::new(State::default(), vec![]);
        let bad = StreamBookmark {
            date: date(2024, 1, 1),
            report_id: Some("J1".to_string()),
            file_count: Some(1),
            offset: 2,
        };
        assert!(store.update("keyword", bad).await.is_err());
    }
}
