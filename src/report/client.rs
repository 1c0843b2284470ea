//! HTTP-backed report job client

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{FileDescriptor, PollOutcome, ReportApi, ReportError, ReportRequest};
use crate::http::ApiClient;
use crate::shutdown::SharedShutdown;

/// Base URL of the reporting API
pub const BASE_URL: &str = "https://www.googleapis.com/doubleclicksearch/v2";

/// Fixed delay between status polls.
///
/// The only timed wait in the system; report generation has no SLA, so the
/// poll loop is unbounded in wall clock.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Report job client over the authenticated HTTP layer
pub struct ReportJobClient {
    api: ApiClient,
    base_url: String,
    poll_interval: Duration,
    shutdown: Option<SharedShutdown>,
}

impl ReportJobClient {
    /// Create a client against the production API
    pub fn new(api: ApiClient, shutdown: Option<SharedShutdown>) -> Self {
        Self::with_base_url(api, BASE_URL, shutdown)
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(
        api: ApiClient,
        base_url: impl Into<String>,
        shutdown: Option<SharedShutdown>,
    ) -> Self {
        Self {
            api,
            base_url: base_url.into(),
            poll_interval: POLL_INTERVAL,
            shutdown,
        }
    }

    /// Override the poll interval (for testing)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn report_url(&self, report_id: &str) -> String {
        format!("{}/reports/{report_id}", self.base_url)
    }

    fn file_url(&self, report_id: &str, ordinal: usize) -> String {
        format!("{}/reports/{report_id}/files/{ordinal}", self.base_url)
    }

    /// Map the poll response's file list to ordered descriptors.
    ///
    /// The response's `url` field is used verbatim when present; otherwise
    /// the download URL is derived from the report id and ordinal.
    fn file_descriptors(&self, report_id: &str, body: &Value) -> Vec<FileDescriptor> {
        let files = body.get("files").and_then(Value::as_array);
        match files {
            Some(files) => files
                .iter()
                .enumerate()
                .map(|(ordinal, file)| FileDescriptor {
                    url: file
                        .get("url")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| self.file_url(report_id, ordinal)),
                    ordinal,
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl ReportApi for ReportJobClient {
    async fn submit(&self, request: &ReportRequest) -> Result<String, ReportError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ReportError::InvalidRequest(e.to_string()))?;
        let url = format!("{}/reports", self.base_url);
        let response = self.api.execute(Method::POST, &url, Some(&body)).await?;

        let report_id = response
            .body
            .get("id")
            .and_then(Value::as_str)
            .ok_or(ReportError::MissingReportId)?
            .to_string();
        info!(report_type = %request.report_type, report_id, "Report submitted");
        Ok(report_id)
    }

    async fn poll(&self, report_id: &str) -> Result<PollOutcome, ReportError> {
        let url = self.report_url(report_id);
        let response = self.api.execute(Method::GET, &url, None).await?;

        let ready = response
            .body
            .get("isReportReady")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !ready {
            debug!(report_id, "Report not ready");
            return Ok(PollOutcome::NotReady);
        }
        Ok(PollOutcome::Ready(
            self.file_descriptors(report_id, &response.body),
        ))
    }

    async fn await_completion(&self, report_id: &str) -> Result<Vec<FileDescriptor>, ReportError> {
        let mut polls: u64 = 0;
        loop {
            if let Some(shutdown) = &self.shutdown {
                if shutdown.is_triggered() {
                    return Err(ReportError::Cancelled);
                }
            }

            polls += 1;
            match self.poll(report_id).await? {
                PollOutcome::Ready(files) => {
                    info!(report_id, files = files.len(), polls, "Report ready");
                    return Ok(files);
                }
                PollOutcome::NotReady => {
                    info!(report_id, polls, "Report still generating, waiting");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
