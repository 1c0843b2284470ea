//! Result file download and CSV decoding
//!
//! Downloads one result file with bearer-header auth, spools the body
//! through a temporary file so large reports are never held resident, and
//! decodes it as delimited text with a header row. The extractor holds no
//! cross-call state: extracting the same URL twice re-downloads and
//! re-decodes deterministically.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

use crate::http::{ApiClient, ApiError};
use crate::Record;

/// Cell values the platform uses to mark absent data
const NULL_MARKERS: &[&str] = &["", "-", "--"];

/// Extracts one result file into an ordered record sequence
#[async_trait]
pub trait FileExtractor: Send + Sync {
    /// Download and decode the file at `url`
    async fn extract(&self, url: &str) -> Result<Vec<Record>, ExtractError>;
}

/// HTTP-backed CSV extractor
pub struct CsvFileExtractor {
    api: ApiClient,
}

impl CsvFileExtractor {
    /// Create an extractor over the authenticated HTTP layer
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl FileExtractor for CsvFileExtractor {
    async fn extract(&self, url: &str) -> Result<Vec<Record>, ExtractError> {
        let response = self.api.execute_download(url).await?;

        // Stage the download in a spool file between download and decode.
        let mut spool =
            tempfile::tempfile().map_err(|e| ExtractError::Io(format!("spool file: {e}")))?;
        let mut stream = response.bytes_stream();
        let mut byte_count: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::Network(e.to_string()))?;
            byte_count += chunk.len() as u64;
            spool
                .write_all(&chunk)
                .map_err(|e| ExtractError::Io(format!("spool write: {e}")))?;
        }
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| ExtractError::Io(format!("spool seek: {e}")))?;
        debug!(url, byte_count, "Result file staged");

        let records = decode_csv(spool)?;
        debug!(url, records = records.len(), "Result file decoded");
        Ok(records)
    }
}

/// Decode delimited tabular text with a header row into records.
///
/// Empty and null-marker cells become [`Value::Null`]; everything else
/// stays a raw string for downstream schema coercion.
pub fn decode_csv<R: Read>(reader: R) -> Result<Vec<Record>, ExtractError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| ExtractError::Decode(format!("header row: {e}")))?
        .clone();

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|e| ExtractError::Decode(e.to_string()))?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| (name.to_string(), normalize_cell(cell)))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn normalize_cell(cell: &str) -> Value {
    if NULL_MARKERS.contains(&cell) {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

/// Extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Download failure from the HTTP layer
    #[error(transparent)]
    Download(#[from] ApiError),

    /// Spool file I/O failure
    #[error("extract I/O error: {0}")]
    Io(String),

    /// Delimited decode failure
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_with_header_row() {
        let data = "keywordId,date,clicks\n123,2024-01-01,42\n456,2024-01-02,7\n";
        let records = decode_csv(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["keywordId"], json!("123"));
        assert_eq!(records[0]["date"], json!("2024-01-01"));
        assert_eq!(records[1]["clicks"], json!("7"));
    }

    #[test]
    fn test_null_markers_normalized() {
        let data = "keywordId,status,cost\n123,,1.5\n456,-,--\n";
        let records = decode_csv(data.as_bytes()).unwrap();
        assert_eq!(records[0]["status"], Value::Null);
        assert_eq!(records[1]["status"], Value::Null);
        assert_eq!(records[1]["cost"], Value::Null);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let data = "a,b\n1,2\n3,4\n";
        let first = decode_csv(data.as_bytes()).unwrap();
        let second = decode_csv(data.as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ragged_row_rejected() {
        let data = "a,b\n1\n";
        assert!(decode_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_file_decodes_to_no_records() {
        let records = decode_csv("a,b\n".as_bytes()).unwrap();
        assert!(records.is_empty());
    }
}
