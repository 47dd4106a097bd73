//! Bounded retry with linear backoff for calls against the remote service.
//!
//! Inputs that are known invalid locally must be rejected before entering
//! the loop; the loop itself only spends attempts on failures that
//! [`FetchError::is_retryable`] says are worth another try.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;

/// How often and how patiently an operation is re-attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Backoff grows linearly: the wait before try `n + 1` is
    /// `base_delay * n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Default budget for metadata and prepare calls.
    pub fn control() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(600),
        }
    }

    /// Default budget for the bulk payload fetch. Fewer tries: a failed
    /// attempt may already have moved a lot of bytes.
    pub fn payload() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(800),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `operation` until it succeeds, fails non-retryably, exhausts the
/// attempt budget, or `token` is cancelled.
///
/// The last observed error is returned unchanged so the original cause
/// survives to the caller. Cancellation is honored both while the operation
/// is in flight and during the backoff sleep.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    token: &CancellationToken,
    label: &'static str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let result = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        log::warn!(
            "{}: attempt {}/{} failed ({}), retrying in {}ms",
            label,
            attempt,
            max_attempts,
            err,
            delay.as_millis()
        );

        tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
