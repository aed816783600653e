//! Retry with linear backoff for transient failures.

use std::future::Future;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Classifies errors as transient (worth retrying) or not.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // Confirmed absence; retrying cannot change the answer.
            FetchError::NotFound { .. } => false,
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            FetchError::Network { .. } => true,
            FetchError::Request { .. } => false,
        }
    }
}

/// Run `operation`, retrying transient errors up to `config.max_retries`
/// times with a delay of `base_delay × attempt` (capped at `max_delay`).
///
/// Returns the first success, the first non-retryable error, or the last
/// error once retries are exhausted.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for(attempt);

                warn!(
                    error = %e,
                    retry = attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
