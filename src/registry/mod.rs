//! Report type registry with static stream metadata
//!
//! Each report type the platform can generate is a variant of [`ReportType`],
//! with its key properties, default replication key, and scope exemptions
//! resolved per variant at stream-construction time rather than through
//! string membership checks.

use crate::schema::StreamSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::str::FromStr;

/// Embedded column schemas, one entry per report type
const SCHEMAS_JSON: &str = include_str!("schemas.json");

/// Parsed schema document (loaded once)
static SCHEMAS: Lazy<Result<Value, RegistryError>> = Lazy::new(|| {
    serde_json::from_str(SCHEMAS_JSON)
        .map_err(|e| RegistryError::ParseError(format!("Failed to parse embedded schemas: {e}")))
});

/// Replication method for a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    /// Incremental replication keyed on the named column
    Incremental {
        /// Column used for watermark comparison
        key: String,
    },
    /// Full-table replication: every decoded record is emitted
    FullTable,
}

impl Replication {
    /// The replication key column, if incremental
    pub fn key(&self) -> Option<&str> {
        match self {
            Replication::Incremental { key } => Some(key),
            Replication::FullTable => None,
        }
    }

    /// Wire name used in catalog metadata
    pub fn method_name(&self) -> &'static str {
        match self {
            Replication::Incremental { .. } => "INCREMENTAL",
            Replication::FullTable => "FULL_TABLE",
        }
    }
}

macro_rules! report_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// A report type the platform can generate
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ReportType {
            $(
                #[doc = $name]
                $variant,
            )+
        }

        impl ReportType {
            /// All supported report types, in catalog order
            pub fn all() -> &'static [ReportType] {
                &[$(ReportType::$variant),+]
            }

            /// Wire name of the report type
            pub fn name(&self) -> &'static str {
                match self {
                    $(ReportType::$variant => $name),+
                }
            }
        }

        impl FromStr for ReportType {
            type Err = RegistryError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(ReportType::$variant),)+
                    _ => Err(RegistryError::UnknownReportType(s.to_string())),
                }
            }
        }
    };
}

report_types! {
    Account => "account",
    Ad => "ad",
    AdGroup => "adGroup",
    AdGroupTarget => "adGroupTarget",
    Advertiser => "advertiser",
    BidStrategy => "bidStrategy",
    Campaign => "campaign",
    CampaignTarget => "campaignTarget",
    Conversion => "conversion",
    FeedItem => "feedItem",
    FloodlightActivity => "floodlightActivity",
    Keyword => "keyword",
    NegativeAdGroupKeyword => "negativeAdGroupKeyword",
    NegativeAdGroupTarget => "negativeAdGroupTarget",
    NegativeCampaignKeyword => "negativeCampaignKeyword",
    NegativeCampaignTarget => "negativeCampaignTarget",
    PaidAndOrganic => "paidAndOrganic",
    ProductAdvertised => "productAdvertised",
    ProductGroup => "productGroup",
    ProductLeadAndCrossSell => "productLeadAndCrossSell",
    ProductTarget => "productTarget",
    Visit => "visit",
}

impl ReportType {
    /// Key properties identifying one row of this stream
    pub fn key_properties(&self) -> Vec<String> {
        vec![format!("{}Id", self.name())]
    }

    /// Whether the report scope may omit the engine-account id
    ///
    /// Advertiser-level reports span engine accounts and must not pin one.
    pub fn engine_account_exempt(&self) -> bool {
        matches!(self, ReportType::Advertiser)
    }

    /// Whether the platform supports date-segmented rows for this type
    ///
    /// Attribute-only list reports (targets, negative keywords, feed items)
    /// carry no statistics and cannot be segmented by date.
    pub fn supports_date_segments(&self) -> bool {
        !matches!(
            self,
            ReportType::AdGroupTarget
                | ReportType::CampaignTarget
                | ReportType::FeedItem
                | ReportType::NegativeAdGroupKeyword
                | ReportType::NegativeAdGroupTarget
                | ReportType::NegativeCampaignKeyword
                | ReportType::NegativeCampaignTarget
                | ReportType::ProductTarget
        )
    }

    /// Default replication for this type, before any configured override
    pub fn default_replication(&self) -> Replication {
        if self.supports_date_segments() {
            Replication::Incremental {
                key: "date".to_string(),
            }
        } else {
            Replication::FullTable
        }
    }

    /// Load the embedded column schema for this type
    pub fn schema(&self) -> Result<StreamSchema, RegistryError> {
        let doc = SCHEMAS.as_ref().map_err(Clone::clone)?;
        let entry = doc.get(self.name()).ok_or_else(|| {
            RegistryError::MissingSchema(self.name().to_string())
        })?;
        StreamSchema::from_value(entry.clone())
            .map_err(|e| RegistryError::ParseError(format!("{}: {e}", self.name())))
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors that can occur when working with the registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Report type not recognized
    #[error("unknown report type: {0}")]
    UnknownReportType(String),

    /// Embedded schema document missing an entry
    #[error("no embedded schema for report type: {0}")]
    MissingSchema(String),

    /// Failed to parse embedded schema JSON
    #[error("registry parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_types_round_trip() {
        for rt in ReportType::all() {
            let parsed = ReportType::from_str(rt.name()).unwrap();
            assert_eq!(parsed, *rt);
        }
        assert_eq!(ReportType::all().len(), 22);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ReportType::from_str("notAReport").is_err());
        assert!(ReportType::from_str("").is_err());
    }

    #[test]
    fn test_key_properties() {
        assert_eq!(ReportType::Keyword.key_properties(), vec!["keywordId"]);
        assert_eq!(ReportType::Account.key_properties(), vec!["accountId"]);
    }

    #[test]
    fn test_engine_account_exemption() {
        assert!(ReportType::Advertiser.engine_account_exempt());
        assert!(!ReportType::Keyword.engine_account_exempt());
    }

    #[test]
    fn test_replication_defaults() {
        assert_eq!(
            ReportType::Keyword.default_replication().key(),
            Some("date")
        );
        assert_eq!(
            ReportType::NegativeCampaignKeyword.default_replication(),
            Replication::FullTable
        );
        assert_eq!(
            ReportType::AdGroupTarget.default_replication(),
            Replication::FullTable
        );
    }

    #[test]
    fn test_every_type_has_embedded_schema() {
        for rt in ReportType::all() {
            let schema = rt.schema().unwrap();
            assert!(
                !schema.column_names().is_empty(),
                "{} has no columns",
                rt.name()
            );
        }
    }

    #[test]
    fn test_incremental_schemas_carry_their_key() {
        for rt in ReportType::all() {
            if let Some(key) = rt.default_replication().key() {
                let schema = rt.schema().unwrap();
                assert!(
                    schema.has_column(key),
                    "{} schema missing replication key {key}",
                    rt.name()
                );
            }
        }
    }
}
