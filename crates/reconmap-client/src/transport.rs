//! The single retrying HTTP transport used for all scan backend calls.
//!
//! Failure classification:
//! - the exchange never completed (connect refused, DNS, timeout): retried
//!   with exponential backoff, then surfaced as `ReconError::Transport`
//! - the server answered with 4xx/5xx: surfaced at once as
//!   `ReconError::Application`, never retried
//! - a 2xx body that does not decode: `ReconError::Decode`, never retried

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use reconmap_core::config::{ReconConfig, RetryConfig};
use reconmap_core::{ReconError, Result};

use crate::auth::AuthHandle;

/// Bounded exponential backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before the `retry`-th retry (1-based): base, 2×base, 4×base, …
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(1000))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }
}

/// Run `attempt` until it succeeds, fails with a non-transport error, or the
/// retry budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0u32;
    loop {
        match attempt().await {
            Err(ReconError::Transport { message, .. }) => {
                if retries >= policy.max_retries {
                    tracing::warn!(
                        operation = %operation,
                        attempts = retries + 1,
                        error = %message,
                        "Giving up after transport failures"
                    );
                    return Err(ReconError::Transport {
                        message,
                        attempts: retries + 1,
                    });
                }

                retries += 1;
                let delay = policy.delay_for(retries);
                tracing::warn!(
                    operation = %operation,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transport failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// HTTP transport bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth: AuthHandle,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &ReconConfig, auth: AuthHandle) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ReconError::Config(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(base_url = %config.base_url, "Scan transport created");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Build an absolute URL for a backend path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let url = url.as_str();
        with_retry(&self.retry, url, || async move {
            let request = self.auth.authorize(self.client.get(url)).await;
            self.execute(request).await
        })
        .await
    }

    /// POST `body` as JSON to `path` and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let url = url.as_str();
        with_retry(&self.retry, url, || async move {
            let request = self.auth.authorize(self.client.post(url).json(body)).await;
            self.execute(request).await
        })
        .await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(transport_error)?;
        decode_response(response).await
    }
}

fn transport_error(e: reqwest::Error) -> ReconError {
    let message = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    ReconError::Transport {
        message,
        attempts: 1,
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await.map_err(transport_error)?;
        return serde_json::from_slice(&bytes).map_err(|e| ReconError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(ReconError::Application {
        status: status.as_u16(),
        message: application_message(status, &body),
    })
}

/// Prefer the backend's structured `message`, then the raw body, then the status text.
fn application_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let raw = body.trim();
            if raw.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                raw.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transport_failure() -> ReconError {
        ReconError::Transport {
            message: "connection refused".to_string(),
            attempts: 1,
        }
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_completes() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = with_retry(&RetryPolicy::default(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transport_failure())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_surface_transport_error() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transport_failure())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(ReconError::Transport { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn application_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ReconError::Application {
                status: 400,
                message: "bad target".to_string(),
            })
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ReconError::Application { status: 400, .. })));
    }

    #[test]
    fn test_application_message_fallbacks() {
        assert_eq!(
            application_message(StatusCode::BAD_REQUEST, r#"{"error":"Bad Request","message":"invalid target"}"#),
            "invalid target"
        );
        assert_eq!(
            application_message(StatusCode::NOT_FOUND, r#"{"error":"Not Found"}"#),
            "Not Found"
        );
        assert_eq!(
            application_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
        assert_eq!(
            application_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }

    #[test]
    fn test_url_joining() {
        let config = ReconConfig {
            base_url: "http://scanner:5000/".to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config, AuthHandle::default()).unwrap();
        assert_eq!(transport.url("/scan/quick"), "http://scanner:5000/scan/quick");
        assert_eq!(transport.url("scan/abc"), "http://scanner:5000/scan/abc");
    }
}
