//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LlmError;

/// How often and how patiently a failed call is retried.
///
/// Only errors for which [`LlmError::is_retryable`] holds are retried. With
/// `max_retries == 0` the first error is returned unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after every retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }

    /// A policy with `max_retries` retries.
    #[must_use]
    pub fn new(max_retries: u32, initial_backoff_ms: u64, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent).min(1_000.0);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        Duration::from_millis(millis.round() as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the operation's error when it is not retryable or when no
    /// retries are configured, and [`LlmError::RetriesExhausted`] once every
    /// configured retry has failed.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || self.max_retries == 0 => return Err(err),
                Err(err) if retry >= self.max_retries => {
                    warn!(attempts = retry + 1, error = %err, "LLM call failed; retries exhausted");
                    return Err(LlmError::RetriesExhausted {
                        attempts: retry + 1,
                        last_error: err.to_string(),
                    });
                }
                Err(err) => {
                    retry += 1;
                    let delay = self.backoff_for(retry);
                    warn!(error = %err, retry, max_retries = self.max_retries, "LLM call failed; retrying");
                    debug!(delay_ms = delay.as_millis(), "Backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn backoff_grows_geometrically() {
        let policy = RetryPolicy::new(3, 100, 2.0);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn no_retries_returns_first_error_unchanged() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::none()
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Status { code: 503, message: "busy".into() })
            })
            .await;
        assert!(matches!(result, Err(LlmError::Status { code: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result = RetryPolicy::new(3, 50, 2.0)
            .run(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::Timeout(10))
                } else {
                    Ok("story")
                }
            })
            .await;
        assert_eq!(result.expect("third attempt succeeds"), "story");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_reported() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::new(2, 10, 1.0)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::RequestFailed("connection reset".into()))
            })
            .await;
        assert!(matches!(result, Err(LlmError::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::new(5, 10, 2.0)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Status { code: 400, message: "bad request".into() })
            })
            .await;
        assert!(matches!(result, Err(LlmError::Status { code: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
