//! HTTP access for the static archive, the realtime feed and webhooks.
//!
//! Network failures are reported as [`FetchError`], separate from the
//! schedule and feed errors of the core. Nothing here retries.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

async fn send<C: HttpClient>(client: &C, req: Request) -> Result<reqwest::Response, FetchError> {
    let url = req.url().to_string();
    let resp = client.execute(req).await?;
    if !resp.status().is_success() {
        return Err(FetchError::Status {
            url,
            status: resp.status(),
        });
    }
    Ok(resp)
}

/// GETs `url` and returns the body. Non-2xx answers are errors.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, FetchError> {
    let req = Request::new(Method::GET, parse_url(url)?);
    let resp = send(client, req).await?;
    Ok(resp.bytes().await?.to_vec())
}

/// Sends a HEAD request and returns the URL reached after redirects.
///
/// Static GTFS endpoints commonly redirect a stable "latest" URL to a
/// dated archive; the final URL names the archive version.
pub async fn resolve_final_url<C: HttpClient>(client: &C, url: &str) -> Result<Url, FetchError> {
    let req = Request::new(Method::HEAD, parse_url(url)?);
    let resp = send(client, req).await?;
    Ok(resp.url().clone())
}

/// POSTs `body` as JSON.
pub async fn post_json<C: HttpClient>(
    client: &C,
    url: &str,
    body: &impl Serialize,
) -> Result<(), FetchError> {
    let mut req = Request::new(Method::POST, parse_url(url)?);
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    send(client, req).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingClient;
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let client = RecordingClient::default();
        let err = fetch_bytes(&client, "not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_is_a_request_error() {
        let client = RecordingClient::default();
        let err = fetch_bytes(&client, "http://example.invalid/feed.pb")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
        assert_eq!(client.requests()[0].method, Method::GET);
    }

    #[tokio::test]
    async fn test_post_json_sends_encoded_body() {
        let client = RecordingClient::default();
        let _ = post_json(&client, "http://example.invalid/hook", &serde_json::json!({"text": "hi"}))
            .await;
        let seen = client.requests();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].body.as_deref(), Some(br#"{"text":"hi"}"#.as_slice()));
    }

    #[tokio::test]
    async fn test_resolve_final_url_uses_head() {
        let client = RecordingClient::default();
        let _ = resolve_final_url(&client, "http://example.invalid/latest.zip").await;
        assert_eq!(client.requests()[0].method, Method::HEAD);
    }
}
