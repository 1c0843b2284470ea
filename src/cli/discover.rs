//! Discover command: print the stream catalog

use clap::Args;
use serde_json::{json, Value};
use std::io::Write;

use super::CliError;
use crate::registry::ReportType;

/// Discover subcommand
#[derive(Debug, Args)]
pub struct DiscoverCommand {}

impl DiscoverCommand {
    /// Build and print the catalog document
    pub fn execute(&self) -> Result<(), CliError> {
        let catalog = build_catalog()?;
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &catalog)
            .map_err(|e| CliError::InvalidArgument(format!("catalog serialization: {e}")))?;
        writeln!(stdout).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        Ok(())
    }
}

/// Catalog document covering every known stream with its schema, key
/// properties, and default replication
pub fn build_catalog() -> Result<Value, CliError> {
    let mut streams = Vec::new();
    for report_type in ReportType::all() {
        let schema = report_type.schema()?;
        let mut entry = json!({
            "stream": report_type.name(),
            "tap_stream_id": report_type.name(),
            "schema": schema.as_value(),
            "key_properties": report_type.key_properties(),
        });
        let replication = report_type.default_replication();
        entry["replication_method"] = json!(replication.method_name());
        if let Some(key) = replication.key() {
            entry["replication_key"] = json!(key);
        }
        streams.push(entry);
    }
    Ok(json!({ "streams": streams }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_every_stream() {
        let catalog = build_catalog().unwrap();
        let streams = catalog["streams"].as_array().unwrap();
        assert_eq!(streams.len(), ReportType::all().len());
    }

    #[test]
    fn test_catalog_entry_shape() {
        let catalog = build_catalog().unwrap();
        let streams = catalog["streams"].as_array().unwrap();
        let keyword = streams
            .iter()
            .find(|s| s["stream"] == "keyword")
            .unwrap();
        assert_eq!(keyword["key_properties"][0], "keywordId");
        assert_eq!(keyword["replication_method"], "INCREMENTAL");
        assert_eq!(keyword["replication_key"], "date");
        assert!(keyword["schema"]["properties"]["date"].is_object());

        let negative = streams
            .iter()
            .find(|s| s["stream"] == "negativeCampaignKeyword")
            .unwrap();
        assert_eq!(negative["replication_method"], "FULL_TABLE");
        assert!(negative.get("replication_key").is_none());
    }
}
