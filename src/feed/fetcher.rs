use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Sent with every feed request.
pub const ACCEPT_HEADER: &str = "application/rss+xml, application/atom+xml, application/feed+json, \
     application/xml, text/xml, application/json;q=0.9, */*;q=0.8";

pub const DEFAULT_USER_AGENT: &str = concat!(
    "feedline/",
    env!("CARGO_PKG_VERSION"),
    " (personal feed reader)"
);

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Runtime settings for HTTP retrieval.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt timeout
    pub request_timeout: Duration,
    /// Retries after the first attempt for 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_backoff: Duration,
    pub max_body_bytes: usize,
    /// Optional proxy; targets are rewritten to `<proxy>?url=<target>`
    pub proxy_url: Option<String>,
    pub user_agent: String,
    /// Permit loopback and private-range hosts
    pub allow_private_networks: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            max_body_bytes: MAX_FEED_SIZE,
            proxy_url: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_private_networks: false,
        }
    }
}

/// Errors that can occur while retrieving a document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// 401/403: the server (or proxy) refused access
    #[error("Access blocked: status {0}")]
    Blocked(u16),
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The configured proxy URL could not be used as a template
    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),
}

/// A successfully retrieved response body.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// The target URL (never the proxy URL)
    pub url: String,
    /// Lowercased `Content-Type` header, if present
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedDocument {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Returns true when a `Content-Type` value names a feed-like media type.
pub fn is_feed_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ["xml", "rss", "atom", "rdf", "json"]
        .iter()
        .any(|marker| ct.contains(marker))
}

/// Builds the shared HTTP client with the feed `Accept` header and user agent.
pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Address actually requested for `target`, after proxy rewriting.
pub fn request_url(target: &str, config: &FetchConfig) -> Result<String, FetchError> {
    match &config.proxy_url {
        None => Ok(target.to_owned()),
        Some(proxy) => Url::parse_with_params(proxy, &[("url", target)])
            .map(|u| u.to_string())
            .map_err(|e| FetchError::InvalidProxy(format!("{proxy}: {e}"))),
    }
}

/// Fetches `url`, retrying rate limits, server errors and truncated bodies
/// with exponential backoff.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - an attempt exceeded `request_timeout`
/// - [`FetchError::Blocked`] - 401 or 403
/// - [`FetchError::HttpStatus`] - other non-2xx, or 5xx after max retries
/// - [`FetchError::RateLimited`] - 429 after max retries
/// - [`FetchError::ResponseTooLarge`] - body above `max_body_bytes`
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    config: &FetchConfig,
) -> Result<FetchedDocument, FetchError> {
    let target = request_url(url, config)?;
    let mut retry_count = 0;

    loop {
        let response = tokio::time::timeout(config.request_timeout, client.get(&target).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();

        // EDGE-004: Handle rate limiting with exponential backoff
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= config.max_retries {
                return Err(FetchError::RateLimited(config.max_retries));
            }
            let delay = backoff(config, retry_count);
            tracing::warn!(
                feed = %url,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if status.is_server_error() {
            if retry_count >= config.max_retries {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            let delay = backoff(config, retry_count);
            tracing::warn!(
                feed = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Blocked(status.as_u16()));
        }

        // 4xx errors fail immediately
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        match read_limited_bytes(response, config.max_body_bytes).await {
            Ok(body) => {
                tracing::debug!(feed = %url, bytes = body.len(), "Fetched document");
                return Ok(FetchedDocument {
                    url: url.to_owned(),
                    content_type,
                    body,
                });
            }
            Err(FetchError::IncompleteResponse { expected, received }) => {
                // EDGE-005: Handle incomplete downloads with retry and exponential backoff
                if retry_count >= config.max_retries {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }
                let delay = backoff(config, retry_count);
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff(config: &FetchConfig, retry: u32) -> Duration {
    config.retry_backoff.saturating_mul(2u32.saturating_pow(retry))
}

/// Single GET without retries; returns the `Content-Type` of a 2xx response.
///
/// Used by discovery to probe well-known paths. Any failure is `None`.
pub async fn probe_content_type(
    client: &reqwest::Client,
    url: &str,
    config: &FetchConfig,
) -> Option<String> {
    let target = request_url(url, config).ok()?;
    let response = tokio::time::timeout(config.request_timeout, client.get(&target).send())
        .await
        .ok()?
        .ok()?;

    if !response.status().is_success() {
        return None;
    }

    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
