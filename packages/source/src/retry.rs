//! HTTP retry helpers for transient errors.
//!
//! Every entity request goes through [`send_text`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so connection failures,
//! timeouts, rate limiting, and server errors are retried with
//! exponential backoff.
//!
//! # Usage
//!
//! ```ignore
//! use crate::retry::{self, RetryPolicy};
//!
//! let body = retry::send_text(&RetryPolicy::default(), || client.get(&url)).await?;
//! ```

use std::time::Duration;

use reqwest::StatusCode;

use crate::FetchError;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry. Doubles on each retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Returns the wait before retry number `attempt` (1-based):
    /// `base`, `2 * base`, `4 * base`, ...
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// How a response status should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Transient,
    Permanent,
}

/// 429 and 5xx are worth retrying; other 4xx are permanent.
fn classify(status: StatusCode) -> StatusClass {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else if status.is_client_error() {
        StatusClass::Permanent
    } else {
        StatusClass::Success
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// Retries up to `policy.max_retries` times on connection errors,
/// timeouts, body read failures, HTTP 429, and HTTP 5xx. Does **not**
/// retry other 4xx statuses.
///
/// # Errors
///
/// Returns [`FetchError`] if the request fails after all retries or the
/// server returns a non-retryable status code.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: &RetryPolicy, build_request: F) -> Result<String, FetchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && can_retry => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(FetchError::Http(e)),
        };

        let url = response.url().to_string();
        let status = response.status();

        match classify(status) {
            StatusClass::Transient if can_retry => {
                log::warn!("  HTTP {status} from {url}");
                continue;
            }
            StatusClass::Transient => {
                return Err(FetchError::RetriesExhausted {
                    url,
                    status: status.as_u16(),
                    retries: max_retries,
                });
            }
            StatusClass::Permanent => {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            StatusClass::Success => {}
        }

        match response.text().await {
            Ok(text) => return Ok(text),
            Err(e) if can_retry => {
                log::warn!(
                    "Response body read failed, re-fetching...\n  \
                     url: {url}\n  \
                     status: {status}\n  \
                     error: {e}",
                );
            }
            Err(e) => {
                log::error!(
                    "Response body read failed after {max_retries} retries, giving up.\n  \
                     url: {url}\n  \
                     status: {status}\n  \
                     error: {e}",
                );
                return Err(FetchError::Http(e));
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `statuses` in order, one per connection, repeating the last.
    /// The body of each response is `{"n":<hit index>}`.
    async fn serve_statuses(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/pokemon/1", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses.get(n).or_else(|| statuses.last()).copied().unwrap_or(500);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(read) => request.extend_from_slice(&buf[..read]),
                    }
                }

                let body = format!("{{\"n\":{n}}}");
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (url, hits)
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_statuses() {
        let (url, hits) = serve_statuses(vec![503, 429, 200]).await;
        let client = reqwest::Client::new();

        let body = send_text(&fast_policy(3), || client.get(&url)).await.unwrap();

        assert_eq!(body, r#"{"n":2}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let (url, hits) = serve_statuses(vec![404]).await;
        let client = reqwest::Client::new();

        let err = send_text(&fast_policy(3), || client.get(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (url, hits) = serve_statuses(vec![500]).await;
        let client = reqwest::Client::new();

        let err = send_text(&fast_policy(2), || client.get(&url))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::RetriesExhausted {
                status: 500,
                retries: 2,
                ..
            }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::Transient);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), StatusClass::Transient);
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusClass::Permanent);
    }
}
