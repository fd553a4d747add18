//! Retrying JSON-over-HTTP client shared by vendor fetchers.
//!
//! Transient failures (connection errors, 429, 5xx) are retried with
//! exponential backoff. Every wait, including the request itself, races the
//! run's cancellation token.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use vulnfeed_types::error::FetchError;

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// Client settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("vulnfeed/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Delay before retry `attempt` (1-based). A server-supplied `Retry-After`
/// wins, still capped.
#[must_use]
pub fn compute_backoff(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    if let Some(secs) = retry_after_secs {
        return Duration::from_millis(secs.saturating_mul(1_000).min(BACKOFF_MAX_MS));
    }
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_MAX_MS))
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] if the underlying client can't be built
    /// (e.g. an invalid user agent).
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Setup(format!("can't build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    /// GET `url` and decode the JSON body, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cancelled`] when `cancel` fires, the last
    /// transport/status error once retries are exhausted, or
    /// [`FetchError::Response`] for a body that isn't valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&'static str, &str)],
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        let headers = build_headers(headers)?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                r = self.get_once(url, headers.clone()) => r,
            };
            match result {
                Ok(body) => {
                    return serde_json::from_slice(&body).map_err(|e| {
                        FetchError::Response(format!("can't decode response from {url}: {e}"))
                    });
                }
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    let retry_after = match &err {
                        FetchError::Status {
                            retry_after_secs, ..
                        } => *retry_after_secs,
                        _ => None,
                    };
                    let delay = compute_backoff(attempt, retry_after);
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(
                        url,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms,
                        error = %err,
                        "Retryable fetch error, will retry"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(FetchError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, url: &str, headers: HeaderMap) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after_secs = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                retry_after_secs,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Header names must be lowercase static strings.
fn build_headers(pairs: &[(&'static str, &str)]) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let value = HeaderValue::from_str(value)
            .map_err(|_| FetchError::Setup(format!("invalid value for header '{name}'")))?;
        headers.insert(HeaderName::from_static(*name), value);
    }
    Ok(headers)
}
