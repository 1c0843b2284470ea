//! Report request wire types and the asynchronous job client
//!
//! A report job is a server-side task: submitting a [`ReportRequest`] yields
//! an opaque report id, polling that id eventually yields an ordered set of
//! downloadable files. Jobs transition `pending -> ready` only via polling
//! and never backward.

use async_trait::async_trait;

use crate::http::ApiError;

mod client;
mod request;

pub use client::{ReportJobClient, BASE_URL, POLL_INTERVAL};
pub use request::{ReportColumn, ReportFilter, ReportRequest, ReportScope, TimeRange};

/// One downloadable result file of a ready report job.
///
/// File sets are ordered and stable once a job is ready; the ordinal is the
/// unit of resume granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Download URL
    pub url: String,
    /// Zero-based position within the job's file set
    pub ordinal: usize,
}

/// Outcome of polling a report job once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The platform is still materializing the report
    NotReady,
    /// The report is ready; descriptors are in ordinal order
    Ready(Vec<FileDescriptor>),
}

/// Report job operations, seam for the sync engine
#[async_trait]
pub trait ReportApi: Send + Sync {
    /// Submit a report-generation request, returning the server-assigned id
    async fn submit(&self, request: &ReportRequest) -> Result<String, ReportError>;

    /// Poll job status once
    async fn poll(&self, report_id: &str) -> Result<PollOutcome, ReportError>;

    /// Poll on a fixed interval until the job is ready.
    ///
    /// Unbounded in wall clock; the platform makes no report-generation SLA.
    /// Each individual poll goes through the HTTP layer's retry policy.
    async fn await_completion(&self, report_id: &str) -> Result<Vec<FileDescriptor>, ReportError>;
}

/// Report job errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Submission response carried no report id
    #[error("submission response carried no report id")]
    MissingReportId,

    /// Request violates a construction invariant
    #[error("invalid report request: {0}")]
    InvalidRequest(String),

    /// Polling abandoned because shutdown was requested
    #[error("report polling cancelled by shutdown request")]
    Cancelled,

    /// HTTP layer failure
    #[error(transparent)]
    Api(#[from] ApiError),
}
