// Retry logic for remote API calls
use super::constants::RETRY_BACKOFF_FACTOR;
use crate::port::ApiError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the call after the backoff delay
    Retry(Duration),
    /// Do not retry, the call has failed permanently
    Failed,
}

/// Retry policy for transient remote failures
///
/// Determines if a failed call should be retried based on:
/// - Error kind (only `ApiError::Transient` is retried)
/// - Attempts already made against `max_retries`
///
/// Backoff: delay = base_delay * (2 ^ attempt)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Example
    /// ```text
    /// let policy = RetryPolicy::new(3, Duration::from_millis(500));
    /// ```
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide what to do after the failed attempt number `attempt` (0-based)
    pub fn should_retry(&self, attempt: u32, error: &ApiError) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::Failed;
        }
        if attempt >= self.max_retries {
            warn!(
                attempt = attempt,
                max_retries = self.max_retries,
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let factor = RETRY_BACKOFF_FACTOR.saturating_pow(attempt);
        RetryDecision::Retry(self.base_delay.saturating_mul(factor))
    }

    /// Run `call` until it succeeds, fails permanently or runs out of retries
    pub async fn call<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => match self.should_retry(attempt, &e) {
                    RetryDecision::Retry(delay) => {
                        info!(
                            call = label,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying remote call"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::Failed => return Err(e),
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            super::constants::DEFAULT_MAX_RETRIES,
            Duration::from_millis(super::constants::DEFAULT_RETRY_BASE_DELAY_MS),
        )
    }
}
