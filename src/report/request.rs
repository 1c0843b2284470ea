//! Report request wire types
//!
//! Serialized shapes are bit-exact against the platform's submit endpoint:
//! camelCase fields, `columns` as a list of `{columnName}` objects, dates as
//! ISO calendar dates.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::registry::ReportType;

/// Scope identifying whose data the report covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportScope {
    /// Agency id
    pub agency_id: String,
    /// Advertiser id
    pub advertiser_id: String,
    /// Engine-account id; required unless the report type is exempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_account_id: Option<String>,
}

/// Requested calendar date range, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    /// First covered date
    pub start_date: NaiveDate,
    /// Last covered date
    pub end_date: NaiveDate,
}

/// One selected column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportColumn {
    /// Platform column name
    pub column_name: String,
}

/// One report row filter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    /// Column the filter applies to
    pub column: ReportColumn,
    /// Filter operator
    pub operator: String,
    /// Operand values
    pub values: Vec<Value>,
}

/// Immutable report-generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Report scope
    pub report_scope: ReportScope,
    /// Report type wire name
    pub report_type: String,
    /// Selected columns, ordered
    pub columns: Vec<ReportColumn>,
    /// Covered date range
    pub time_range: TimeRange,
    /// Row filters
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<ReportFilter>,
    /// Output format; the platform materializes delimited files
    pub download_format: String,
    /// Cap on rows per generated file
    pub max_rows_per_file: u64,
    /// Currency mode for statistics columns
    pub statistics_currency: String,
}

impl ReportRequest {
    /// Build and validate a request for one report type
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        report_type: ReportType,
        scope: ReportScope,
        columns: Vec<String>,
        time_range: TimeRange,
        filters: Vec<ReportFilter>,
        max_rows_per_file: u64,
        statistics_currency: String,
    ) -> Result<Self, String> {
        let request = Self {
            report_scope: scope,
            report_type: report_type.name().to_string(),
            columns: columns
                .into_iter()
                .map(|column_name| ReportColumn { column_name })
                .collect(),
            time_range,
            filters,
            download_format: "CSV".to_string(),
            max_rows_per_file,
            statistics_currency,
        };
        request.validate(report_type)?;
        Ok(request)
    }

    /// Validate construction invariants
    pub fn validate(&self, report_type: ReportType) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err("column list cannot be empty".to_string());
        }
        if self.time_range.start_date > self.time_range.end_date {
            return Err(format!(
                "start date ({}) must not be after end date ({})",
                self.time_range.start_date, self.time_range.end_date
            ));
        }
        if self.report_scope.engine_account_id.is_none() && !report_type.engine_account_exempt() {
            return Err(format!(
                "report type {} requires an engine-account id",
                report_type
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> ReportScope {
        ReportScope {
            agency_id: "20700000001".into(),
            advertiser_id: "21700000002".into(),
            engine_account_id: Some("700000003".into()),
        }
    }

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> TimeRange {
        TimeRange {
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        }
    }

    #[test]
    fn test_wire_shape_matches_platform_contract() {
        let request = ReportRequest::new(
            ReportType::Keyword,
            scope(),
            vec!["keywordId".into(), "date".into()],
            range((2024, 1, 1), (2024, 1, 31)),
            vec![ReportFilter {
                column: ReportColumn {
                    column_name: "status".into(),
                },
                operator: "equals".into(),
                values: vec![json!("Active")],
            }],
            100_000_000,
            "agency".into(),
        )
        .unwrap();

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "reportScope": {
                    "agencyId": "20700000001",
                    "advertiserId": "21700000002",
                    "engineAccountId": "700000003"
                },
                "reportType": "keyword",
                "columns": [
                    {"columnName": "keywordId"},
                    {"columnName": "date"}
                ],
                "timeRange": {
                    "startDate": "2024-01-01",
                    "endDate": "2024-01-31"
                },
                "filters": [
                    {
                        "column": {"columnName": "status"},
                        "operator": "equals",
                        "values": ["Active"]
                    }
                ],
                "downloadFormat": "CSV",
                "maxRowsPerFile": 100000000u64,
                "statisticsCurrency": "agency"
            })
        );
    }

    #[test]
    fn test_empty_filters_omitted_from_wire() {
        let request = ReportRequest::new(
            ReportType::Keyword,
            scope(),
            vec!["keywordId".into()],
            range((2024, 1, 1), (2024, 1, 2)),
            vec![],
            1000,
            "agency".into(),
        )
        .unwrap();
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("filters").is_none());
    }

    #[test]
    fn test_empty_columns_rejected() {
        let result = ReportRequest::new(
            ReportType::Keyword,
            scope(),
            vec![],
            range((2024, 1, 1), (2024, 1, 2)),
            vec![],
            1000,
            "agency".into(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = ReportRequest::new(
            ReportType::Keyword,
            scope(),
            vec!["keywordId".into()],
            range((2024, 1, 2), (2024, 1, 1)),
            vec![],
            1000,
            "agency".into(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_account_required_unless_exempt() {
        let mut no_engine = scope();
        no_engine.engine_account_id = None;

        let keyword = ReportRequest::new(
            ReportType::Keyword,
            no_engine.clone(),
            vec!["keywordId".into()],
            range((2024, 1, 1), (2024, 1, 2)),
            vec![],
            1000,
            "agency".into(),
        );
        assert!(keyword.is_err());

        let advertiser = ReportRequest::new(
            ReportType::Advertiser,
            no_engine,
            vec!["advertiserId".into()],
            range((2024, 1, 1), (2024, 1, 2)),
            vec![],
            1000,
            "agency".into(),
        );
        assert!(advertiser.is_ok());
    }
}
