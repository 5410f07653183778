//! Exponential backoff for retryable upstream failures.
//!
//! Replaces decorator-style retries with an explicit helper: callers say how
//! many attempts and the wait window, the helper drives the loop and only
//! retries errors classified retryable.

use std::future::Future;
use std::time::Duration;

use dl_domain::config::RetryConfig;
use dl_domain::error::Result;

/// Backoff policy: exponential growth from `min_wait`, capped at `max_wait`,
/// with deterministic jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl From<RetryConfig> for Backoff {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_wait: Duration::from_millis(config.min_wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }
}

impl Backoff {
    /// Compute the delay before retrying after the given failed attempt
    /// (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.min_wait.as_millis() as f64;
        let delay_ms = base_ms * 2f64.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_wait.as_millis() as f64);

        // ~25% jitter to spread retry storms; deterministic so turns replay.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(attempt);
        Duration::from_millis((capped_ms + jitter).min(self.max_wait.as_millis() as f64) as u64)
    }
}

/// Cheap deterministic "random" fraction [0, 1) based on attempt number.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_add(1).wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64)
}

/// Run `operation` until it succeeds, fails terminally, or exhausts the
/// attempt budget. Only errors with `is_retryable()` are retried.
pub async fn retry_with_backoff<T, F, Fut>(backoff: Backoff, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < backoff.max_attempts => {
                let delay = backoff.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = backoff.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable upstream failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_domain::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_until_capped() {
        let backoff = Backoff {
            max_attempts: 5,
            min_wait: Duration::from_millis(100),
            max_wait: Duration::from_millis(1_000),
        };
        let d0 = backoff.delay_for_attempt(0);
        let d1 = backoff.delay_for_attempt(1);
        assert!(d1 > d0);
        for attempt in 0..10 {
            assert!(backoff.delay_for_attempt(attempt) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn delay_is_deterministic() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for_attempt(2), backoff.delay_for_attempt(2));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_up_to_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(Backoff::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::upstream_retryable("llm", "503")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_terminal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(Backoff::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::upstream("llm", "401 unauthorized")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(Backoff::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::upstream_retryable("llm", "timeout"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
    }
}
