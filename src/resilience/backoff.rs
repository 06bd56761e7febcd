//! # Retry Policy
//!
//! Exponential backoff with a cap and optional jitter. The same policy type drives
//! both retry layers: attempts against one endpoint within a dispatch call, and
//! re-enqueues of a task across dispatch calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Parameters for exponential backoff: `min(base_delay * 2^attempt, max_delay)` plus jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay, as a fraction of the computed delay
    pub jitter_factor: f64,
}

/// Last error from an exhausted or aborted retry sequence
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Policy without jitter, for deterministic delays
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before the retry that follows zero-based attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        let jittered = if self.jitter_factor > 0.0 {
            let jitter = fastrand::f64() * self.jitter_factor;
            delay.mul_f64(1.0 + jitter)
        } else {
            delay
        };

        jittered.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts_made`
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Run `operation` until it succeeds, returns a non-retryable error, the attempt
    /// budget runs out, or the next backoff would overrun `deadline`.
    ///
    /// The operation receives the zero-based attempt number.
    pub async fn retry<T, E, F, Fut, R>(
        &self,
        deadline: Option<Instant>,
        mut operation: F,
        is_retryable: R,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            attempt += 1;

            if !is_retryable(&error) || !self.allows_retry(attempt) {
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.delay_for(attempt - 1);
            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    debug!(
                        attempts = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Backoff would pass the deadline - giving up"
                    );
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                    });
                }
            }

            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::constants::defaults;
        Self::new(
            defaults::MAX_RETRIES,
            Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            defaults::JITTER_FACTOR,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_secs(2),
            0.0,
        )
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = policy(10);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for(40), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10), 0.5);
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
        assert_eq!(policy.without_jitter().delay_for(1), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<u32, RetryFailure<&str>> = policy(5)
            .retry(
                None,
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err("unavailable")
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let result: Result<(), RetryFailure<&str>> = policy(5)
            .retry(None, |_| async { Err("invalid") }, |_| false)
            .await;
        assert_eq!(
            result,
            Err(RetryFailure {
                error: "invalid",
                attempts: 1
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_and_deadline_are_honored() {
        let exhausted: Result<(), RetryFailure<&str>> = policy(3)
            .retry(None, |_| async { Err("down") }, |_| true)
            .await;
        assert_eq!(exhausted.unwrap_err().attempts, 3);

        let deadline = Instant::now() + Duration::from_millis(250);
        let bounded: Result<(), RetryFailure<&str>> = policy(10)
            .retry(Some(deadline), |_| async { Err("down") }, |_| true)
            .await;
        // 100ms sleep fits, the following 200ms would not
        assert_eq!(bounded.unwrap_err().attempts, 2);
        assert!(Instant::now() < deadline);
    }
}
