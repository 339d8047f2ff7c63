//! Timeouts and bounded retry around store calls.
//!
//! Every directory call goes through a [`StoreGuard`]. Reads are retried on
//! [`StoreError::Unavailable`] and [`StoreError::Timeout`]. Writes are
//! retried on `Unavailable` only: a timed-out commit may still have been
//! applied, and replaying it would trip its own preconditions.

use std::future::Future;
use std::time::Duration;

use crate::store::StoreError;

/// Backoff schedule for transient store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the given zero-based failed attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Per-call timeout plus retry policy applied to store calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreGuard {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// What to do when an attempt fails transiently.
    pub retry: RetryPolicy,
}

impl Default for StoreGuard {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

const fn retryable_read(err: &StoreError) -> bool {
    matches!(err, StoreError::Unavailable(_) | StoreError::Timeout(_))
}

const fn retryable_write(err: &StoreError) -> bool {
    matches!(err, StoreError::Unavailable(_))
}

impl StoreGuard {
    /// Creates a guard with the given timeout and retry policy.
    #[must_use]
    pub const fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Runs a read, retrying on unavailability and timeouts.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error.
    pub async fn read<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.run(op, retryable_read, call).await
    }

    /// Runs a write, retrying only when the backend was unreachable.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error.
    pub async fn write<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.run(op, retryable_write, call).await
    }

    async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        retryable: fn(&StoreError) -> bool,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => StoreError::Timeout(self.timeout),
            };

            attempt += 1;
            if !retryable(&err) || attempt >= attempts {
                if attempt > 1 {
                    tracing::warn!(op, attempts = attempt, error = %err, "store call gave up");
                }
                return Err(err);
            }

            let delay = self.retry.backoff(attempt - 1);
            tracing::debug!(
                op,
                attempt,
                max_attempts = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "store call failed, will retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
