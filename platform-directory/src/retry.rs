//! Bounded retries with exponential backoff.
//!
//! Structural changes that lose a race (prefix lock timeout, stale version at
//! commit) fail with [`DirectoryError::ConcurrentModification`]. The façade
//! re-runs them a bounded number of times before surfacing the error; every
//! other error is returned immediately.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{DirectoryError, DirectoryResult};

/// Retry policy for structural changes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(25))
    }
}

impl RetryPolicy {
    /// Policy doubling `initial_delay` up to one second.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    /// Policy that runs the operation exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted.
    pub async fn run<F, Fut, T>(&self, operation: &'static str, mut f: F) -> DirectoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempts = attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    tracing::error!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Giving up after concurrent modifications"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Concurrent modification, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Shorthand for a retryable conflict error.
pub(crate) fn conflict(reason: impl Into<String>) -> DirectoryError {
    DirectoryError::ConcurrentModification(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(300));
        assert_eq!(policy.delay_after(1), Duration::from_millis(300));
        assert_eq!(policy.delay_after(2), Duration::from_millis(600));
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
    }

    #[test]
    fn test_new_keeps_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_concurrent_modification() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .run("test", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(conflict("busy"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));

        let result: DirectoryResult<()> = policy
            .run("test", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(conflict("busy"))
                }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::ConcurrentModification(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_caller_errors_return_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));

        let result: DirectoryResult<()> = policy
            .run("test", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DirectoryError::ParentNotFound(Uuid::nil()))
                }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::ParentNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
