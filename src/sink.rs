//! Record and state emission protocol
//!
//! Records leave the connector as JSON-lines messages: a SCHEMA message per
//! stream before its records, RECORD messages carrying the extraction
//! timestamp, and STATE messages after bookmark mutations.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Mutex;

use crate::state::{State, StateError, StateSink};
use crate::Record;

/// Receives emitted schemas and records
pub trait RecordSink: Send + Sync {
    /// Emit a stream's schema before its records
    fn emit_schema(
        &self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
    ) -> Result<(), SinkError>;

    /// Emit one record with its extraction timestamp
    fn emit(
        &self,
        stream: &str,
        record: &Record,
        time_extracted: DateTime<Utc>,
    ) -> Result<(), SinkError>;
}

/// JSON-lines sink writing SCHEMA/RECORD/STATE messages to one writer
pub struct JsonLinesSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    /// Sink writing to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Sink writing to an arbitrary writer (for testing)
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_message(&self, message: Value) -> Result<(), SinkError> {
        let line = serde_json::to_string(&message)
            .map_err(|e| SinkError::Serialization(e.to_string()))?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| SinkError::Io("sink writer poisoned".to_string()))?;
        writeln!(out, "{line}").map_err(|e| SinkError::Io(e.to_string()))?;
        out.flush().map_err(|e| SinkError::Io(e.to_string()))
    }
}

impl RecordSink for JsonLinesSink {
    fn emit_schema(
        &self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
    ) -> Result<(), SinkError> {
        self.write_message(json!({
            "type": "SCHEMA",
            "stream": stream,
            "schema": schema,
            "key_properties": key_properties,
        }))
    }

    fn emit(
        &self,
        stream: &str,
        record: &Record,
        time_extracted: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.write_message(json!({
            "type": "RECORD",
            "stream": stream,
            "record": record,
            "time_extracted": time_extracted.to_rfc3339_opts(SecondsFormat::Micros, true),
        }))
    }
}

impl StateSink for JsonLinesSink {
    fn persist(&self, state: &State) -> Result<(), StateError> {
        let value =
            serde_json::to_value(state).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.write_message(json!({"type": "STATE", "value": value}))
            .map_err(|e| StateError::Io(e.to_string()))
    }
}

/// Emission errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writer failure
    #[error("sink I/O error: {0}")]
    Io(String),

    /// Message serialization failure
    #[error("sink serialization error: {0}")]
    Serialization(String),
}
