//! Retry-loop tests against a local HTTP listener
//!
//! Drives the real request path end to end: a scripted listener answers
//! each connection with the next canned status, so the tests observe how
//! many attempts the client actually makes and what the caller sees once
//! the budget is spent.

use async_trait::async_trait;
use reqwest::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use searchads_sync::auth::{AuthError, OauthTokenProvider, TokenProvider};
use searchads_sync::http::{ApiClient, ApiError};

struct StaticTokens;

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok("token".to_string())
    }
    async fn invalidate(&self) {}
}

/// Answer one connection per scripted response, counting hits.
///
/// Every response closes its connection so each client attempt arrives as
/// a fresh accept.
async fn serve_script(
    listener: TcpListener,
    script: Vec<(u16, &'static str)>,
    hits: Arc<AtomicUsize>,
) {
    for (status, body) in script {
        let (mut socket, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        hits.fetch_add(1, Ordering::SeqCst);
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let reason = match status {
            200 => "OK",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            _ => "Error",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\n\
             content-type: application/json\r\n\
             content-length: {}\r\n\
             connection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }
}

async fn scripted_server(script: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve_script(listener, script, hits.clone()));
    (format!("http://{addr}"), hits)
}

fn api_client() -> ApiClient {
    ApiClient::new(reqwest::Client::new(), Arc::new(StaticTokens))
}

#[tokio::test]
async fn test_three_rate_limits_then_success_yields_one_success() {
    let (base, hits) = scripted_server(vec![
        (429, "{}"),
        (429, "{}"),
        (429, "{}"),
        (200, r#"{"id": "J1"}"#),
    ])
    .await;

    let response = api_client()
        .execute(Method::GET, &format!("{base}/reports/J1"), None)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body["id"], "J1");
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_exhausted_retry_budget_surfaces_last_rate_limit() {
    let (base, hits) = scripted_server(vec![
        (429, "{}"),
        (429, "{}"),
        (429, "{}"),
        (429, "{}"),
        // Never reached: the budget is the initial attempt plus three retries.
        (200, r#"{"id": "J1"}"#),
    ])
    .await;

    let result = api_client()
        .execute(Method::GET, &format!("{base}/reports/J1"), None)
        .await;

    assert!(matches!(result, Err(ApiError::TooManyRequests)));
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_token_refresh_retries_server_errors_then_succeeds() {
    let (base, hits) = scripted_server(vec![
        (500, ""),
        (500, ""),
        (500, ""),
        (200, r#"{"access_token": "fresh", "expires_in": 3600}"#),
    ])
    .await;

    let provider = OauthTokenProvider::with_token_uri(
        reqwest::Client::new(),
        format!("{base}/token"),
        "id",
        "secret",
        "refresh",
    );
    let token = provider.access_token().await.unwrap();

    assert_eq!(token, "fresh");
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_client_error_from_token_endpoint_is_not_retried() {
    let (base, hits) = scripted_server(vec![(400, r#"{"error": "invalid_grant"}"#)]).await;

    let provider = OauthTokenProvider::with_token_uri(
        reqwest::Client::new(),
        format!("{base}/token"),
        "id",
        "secret",
        "refresh",
    );
    let result = provider.access_token().await;

    assert!(matches!(
        result,
        Err(AuthError::TokenEndpoint { status: 400, .. })
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
