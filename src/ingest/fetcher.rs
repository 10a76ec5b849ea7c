use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RetryConfig, SourceConfig};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// Transient variants (timeouts, 5xx, rate limiting) have already been
/// retried by the time the caller sees them; permanent variants (4xx)
/// fail on the first attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the per-source timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// A fetched feed document, handed from the fetcher to the parser and
/// discarded after parsing.
#[derive(Debug)]
pub struct RawDocument {
    pub source_name: String,
    pub bytes: Vec<u8>,
    pub fetched_at: i64,
    pub content_type: Option<String>,
}

/// Fetch one source's raw feed document.
///
/// Applies the per-source timeout to every attempt. Transient failures
/// (attempt timeout, connection errors, 429, 5xx) retry up to
/// `retry.max_attempts` with exponential backoff; 4xx responses fail
/// immediately. The response body is streamed with a hard size cap.
///
/// Does not mutate any source state; each call is independent, so one
/// source's failure never affects another's fetch.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - every attempt exceeded the timeout
/// - [`FetchError::Network`] - connection or TLS errors after retries
/// - [`FetchError::HttpStatus`] - non-2xx response (5xx after retries)
/// - [`FetchError::RateLimited`] - 429 after max retries
/// - [`FetchError::ResponseTooLarge`] - body exceeded 10MB
pub async fn fetch(
    client: &reqwest::Client,
    source: &SourceConfig,
    timeout: Duration,
    retry: &RetryConfig,
) -> Result<RawDocument, FetchError> {
    let mut attempt = 0;

    let (bytes, content_type) = loop {
        let backoff =
            Duration::from_millis(retry.base_backoff_ms.saturating_mul(2u64.saturating_pow(attempt)));

        let response = match tokio::time::timeout(timeout, client.get(&source.url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // Connection-level failures are transient; retry them
                if attempt >= retry.max_attempts {
                    return Err(FetchError::Network(e));
                }
                tracing::warn!(
                    source = %source.name,
                    error = %e,
                    attempt = attempt,
                    "Connection error, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }
            Err(_) => {
                if attempt >= retry.max_attempts {
                    return Err(FetchError::Timeout);
                }
                tracing::warn!(
                    source = %source.name,
                    attempt = attempt,
                    "Fetch timed out, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }
        };

        // Rate limiting gets its own error so the summary can name it
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if attempt >= retry.max_attempts {
                return Err(FetchError::RateLimited(retry.max_attempts));
            }
            tracing::warn!(
                source = %source.name,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
            continue;
        }

        // Server errors (5xx) are transient
        if response.status().is_server_error() {
            if attempt >= retry.max_attempts {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }
            tracing::warn!(
                source = %source.name,
                status = %response.status(),
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Server error, retrying after backoff"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
            continue;
        }

        // Client errors (4xx) are permanent; fail immediately
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => break (bytes, content_type),
            Err(FetchError::IncompleteResponse { expected, received }) => {
                // Truncated mid-stream; retry like any other transient failure
                if attempt >= retry.max_attempts {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }
                tracing::debug!(
                    source = %source.name,
                    expected = expected,
                    received = received,
                    attempt = attempt,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    };

    Ok(RawDocument {
        source_name: source.name.clone(),
        bytes,
        fetched_at: chrono::Utc::now().timestamp(),
        content_type,
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
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

    // A short read means the connection dropped mid-body; callers retry
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn source(url: &str) -> SourceConfig {
        SourceConfig {
            name: "Test".to_string(),
            url: url.to_string(),
            country: String::new(),
            fetch_timeout_secs: None,
            keep_all: false,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(VALID_RSS.as_bytes(), "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let doc = fetch(
            &client,
            &source(&format!("{}/feed", mock_server.uri())),
            Duration::from_secs(5),
            &fast_retry(),
        )
        .await
        .unwrap();

        assert_eq!(doc.bytes, VALID_RSS.as_bytes());
        assert_eq!(doc.content_type.as_deref(), Some("application/rss+xml"));
        assert_eq!(doc.source_name, "Test");
    }

    #[tokio::test]
    async fn test_fetch_404_fails_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1) // No retries for client errors
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            &source(&format!("{}/feed", mock_server.uri())),
            Duration::from_secs(5),
            &fast_retry(),
        )
        .await;

        match result.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            &source(&format!("{}/feed", mock_server.uri())),
            Duration::from_secs(5),
            &fast_retry(),
        )
        .await;

        match result.unwrap_err() {
            FetchError::HttpStatus(500) => {}
            e => panic!("Expected HttpStatus(500), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        // First two requests return 503, third succeeds
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let doc = fetch(
            &client,
            &source(&format!("{}/feed", mock_server.uri())),
            Duration::from_secs(5),
            &fast_retry(),
        )
        .await
        .unwrap();

        assert_eq!(doc.bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_429_exhausts_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            &source(&format!("{}/feed", mock_server.uri())),
            Duration::from_secs(5),
            &fast_retry(),
        )
        .await;

        match result.unwrap_err() {
            FetchError::RateLimited(3) => {}
            e => panic!("Expected RateLimited(3), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Nothing listens on this port; connection errors are retried,
        // then surfaced as a network error.
        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            &source("http://127.0.0.1:1/feed"),
            Duration::from_secs(5),
            &RetryConfig {
                max_attempts: 1,
                base_backoff_ms: 1,
            },
        )
        .await;

        assert!(matches!(result.unwrap_err(), FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_response_too_large() {
        let mock_server = MockServer::start().await;
        let body = vec![b'x'; MAX_FEED_SIZE + 1];
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            &source(&format!("{}/feed", mock_server.uri())),
            Duration::from_secs(5),
            &fast_retry(),
        )
        .await;

        assert!(matches!(result.unwrap_err(), FetchError::ResponseTooLarge));
    }
}
