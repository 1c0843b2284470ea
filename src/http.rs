//! Authenticated HTTP request layer
//!
//! Issues API calls with a current access token, classifies responses into
//! success / retryable / fatal, and retries retryable classifications with
//! bounded exponential backoff. Report API calls authenticate with an
//! `access_token` query parameter; result-file downloads use an
//! `Authorization: Bearer` header (the download endpoint requires it).

use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{AuthError, TokenProvider};

/// Retries per request after the initial attempt
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds, doubled per attempt
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Cap on the exponential backoff delay
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Calculate exponential backoff delay for a zero-based retry count
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// A classified successful response
#[derive(Debug)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body decoded as JSON, [`Value::Null`] when empty or not JSON
    pub body: Value,
}

/// Outcome of classifying one HTTP response
#[derive(Debug)]
pub enum Classification {
    /// 200/202: the call succeeded
    Success,
    /// Retryable within the attempt budget
    Retry(ApiError),
    /// Not retryable; surfaced to the caller immediately
    Fatal(ApiError),
}

/// Classify a response status and decoded body per the platform's contract
pub fn classify(status: u16, body: &Value) -> Classification {
    match status {
        200 | 202 => Classification::Success,
        429 => Classification::Retry(ApiError::TooManyRequests),
        401 if error_reason(body) == Some("expired") => {
            Classification::Retry(ApiError::TokenExpired)
        }
        _ => Classification::Fatal(ApiError::FatalHttp {
            status,
            message: error_message(body).unwrap_or("request failed").to_string(),
        }),
    }
}

/// Server-provided error reason (`error.errors[0].reason`)
fn error_reason(body: &Value) -> Option<&str> {
    body.get("error")?
        .get("errors")?
        .get(0)?
        .get("reason")?
        .as_str()
}

/// Server-provided error message (`error.message`)
fn error_message(body: &Value) -> Option<&str> {
    body.get("error")?.get("message")?.as_str()
}

/// Authenticated API client shared across stream workers
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Create a client over a shared token provider
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { http, tokens }
    }

    /// Execute an API call with retry and backoff.
    ///
    /// Retryable classifications (429, 401-expired, network failures) are
    /// retried up to [`MAX_RETRIES`] times after the initial attempt, with
    /// exponential backoff between attempts; on exhaustion the last
    /// retryable error is surfaced. A token-expired
    /// response invalidates the credential cache so the next attempt
    /// refreshes before sending.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = calculate_backoff(attempt - 1);
                debug!(?backoff, attempt, "Retrying request");
                tokio::time::sleep(backoff).await;
            }

            let token = self.tokens.access_token().await?;
            let mut request = self
                .http
                .request(method.clone(), url)
                .query(&[("access_token", token.as_str())]);
            if let Some(json) = body {
                request = request.json(json);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%method, url, attempt = attempt + 1, error = %e, "Network error");
                    last_error = Some(ApiError::Network(e.to_string()));
                    continue;
                }
            };

            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let decoded: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            debug!(%method, url, status, "API call");

            match classify(status, &decoded) {
                Classification::Success => {
                    return Ok(ApiResponse {
                        status,
                        body: decoded,
                    })
                }
                Classification::Retry(error) => {
                    if matches!(error, ApiError::TokenExpired) {
                        self.tokens.invalidate().await;
                    }
                    warn!(%method, url, status, attempt = attempt + 1, %error, "Retryable response");
                    last_error = Some(error);
                }
                Classification::Fatal(error) => {
                    warn!(%method, url, status, %error, "Fatal response");
                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::Network("all attempts exhausted".into())))
    }

    /// Execute a result-file download with bearer-header auth.
    ///
    /// Same classification and retry policy as [`execute`](Self::execute),
    /// but the successful response is returned undecoded so the caller can
    /// stream the body.
    pub async fn execute_download(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = calculate_backoff(attempt - 1);
                debug!(?backoff, attempt, "Retrying download");
                tokio::time::sleep(backoff).await;
            }

            let token = self.tokens.access_token().await?;
            let response = match self.http.get(url).bearer_auth(&token).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url, attempt = attempt + 1, error = %e, "Network error");
                    last_error = Some(ApiError::Network(e.to_string()));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if matches!(status, 200 | 202) {
                debug!(url, status, "Download started");
                return Ok(response);
            }

            let text = response.text().await.unwrap_or_default();
            let decoded: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            match classify(status, &decoded) {
                // Unreachable: success handled above before consuming the body.
                Classification::Success => continue,
                Classification::Retry(error) => {
                    if matches!(error, ApiError::TokenExpired) {
                        self.tokens.invalidate().await;
                    }
                    warn!(url, status, attempt = attempt + 1, %error, "Retryable response");
                    last_error = Some(error);
                }
                Classification::Fatal(error) => {
                    warn!(url, status, %error, "Fatal response");
                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::Network("all attempts exhausted".into())))
    }
}

/// HTTP layer errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rate limited by the platform (HTTP 429)
    #[error("rate limit exceeded")]
    TooManyRequests,

    /// Access token rejected as expired (HTTP 401, reason `expired`)
    #[error("access token expired")]
    TokenExpired,

    /// Non-retryable server error, carrying the server message
    #[error("HTTP {status}: {message}")]
    FatalHttp {
        /// HTTP status code
        status: u16,
        /// Server-provided error message
        message: String,
    },

    /// Network-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Token acquisition failure
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Whether this error class is retried within the attempt budget
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::TooManyRequests | ApiError::TokenExpired | ApiError::Network(_)
        )
    }
}
