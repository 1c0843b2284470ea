//! OAuth2 token acquisition and caching
//!
//! The credential cache is shared across all concurrent stream workers.
//! Refresh is single-flight: the cache mutex is held across the token
//! endpoint call, so concurrent callers that observe an expired token wait
//! for the in-flight refresh instead of each issuing a duplicate one.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::http::calculate_backoff;

/// Google OAuth2 token endpoint
pub const TOKEN_URI: &str = "https://accounts.google.com/o/oauth2/token";

/// Retries against the token endpoint after the initial attempt (on 5xx only)
const TOKEN_MAX_RETRIES: u32 = 3;

/// Safety margin subtracted from the reported token lifetime
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Supplies a current access token for API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently valid access token, refreshing if expired
    async fn access_token(&self) -> Result<String, AuthError>;

    /// Drop any cached token so the next call refreshes
    async fn invalidate(&self);
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Token provider backed by the OAuth2 refresh-token grant
pub struct OauthTokenProvider {
    http: reqwest::Client,
    token_uri: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl OauthTokenProvider {
    /// Create a provider against the default Google token endpoint
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self::with_token_uri(http, TOKEN_URI, client_id, client_secret, refresh_token)
    }

    /// Create a provider against a custom token endpoint (for testing)
    pub fn with_token_uri(
        http: reqwest::Client,
        token_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_uri: token_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            cached: Mutex::new(None),
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Retried with exponential backoff strictly on 5xx responses from the
    /// token endpoint; any other failure is fatal to the calling operation.
    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let mut last_error = None;
        for attempt in 0..=TOKEN_MAX_RETRIES {
            if attempt > 0 {
                let backoff = calculate_backoff(attempt - 1);
                debug!(?backoff, attempt, "Retrying token refresh");
                tokio::time::sleep(backoff).await;
            }

            let response = self
                .http
                .post(&self.token_uri)
                .form(&params)
                .send()
                .await
                .map_err(|e| AuthError::Network(e.to_string()))?;

            let status = response.status();
            if status.is_server_error() {
                warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    "Token endpoint server error"
                );
                last_error = Some(AuthError::TokenEndpoint {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
                continue;
            }
            if !status.is_success() {
                return Err(AuthError::TokenEndpoint {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
            let expires_at = Utc::now()
                + ChronoDuration::seconds((token.expires_in - EXPIRY_MARGIN_SECS).max(0));
            debug!(%expires_at, "Access token refreshed");
            return Ok(CachedToken {
                access_token: token.access_token,
                expires_at,
            });
        }

        Err(last_error.unwrap_or_else(|| AuthError::Network("token refresh exhausted".into())))
    }
}

#[async_trait]
impl TokenProvider for OauthTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_valid(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }
        // Lock held across the refresh: single-flight per expiry.
        let fresh = self.refresh().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        *cached = None;
    }
}

/// Token acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Token endpoint returned a non-success status
    #[error("token endpoint returned HTTP {status}: {message}")]
    TokenEndpoint {
        /// HTTP status from the token endpoint
        status: u16,
        /// Response body, if any
        message: String,
    },

    /// Token endpoint response did not decode
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// Network failure reaching the token endpoint
    #[error("token endpoint network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_expiry() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: now + ChronoDuration::seconds(10),
        };
        assert!(token.is_valid(now));
        assert!(!token.is_valid(now + ChronoDuration::seconds(11)));
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let provider = OauthTokenProvider::new(reqwest::Client::new(), "id", "secret", "refresh");
        {
            let mut cached = provider.cached.lock().await;
            *cached = Some(CachedToken {
                access_token: "t".into(),
                expires_at: Utc::now() + ChronoDuration::hours(1),
            });
        }
        provider.invalidate().await;
        assert!(provider.cached.lock().await.is_none());
    }
}
