//! Retry policy for transient provider failures.
//!
//! HTTP 429 / 5xx errors are transient and frequent under concurrent load.
//! Exponential backoff (`base_backoff_ms * 2^(attempt-1)`, capped at
//! `max_backoff_ms`) with full jitter spreads retries from concurrent workers
//! so they do not hit the provider in lock-step. With a 500 ms base and
//! 2 retries the worst-case wait is 500 ms + 1 s.
//!
//! Only errors for which [`ExtractError::is_retryable`] is true are retried.
//! Schema violations and configuration errors are returned on first sight.

use crate::error::ExtractError;
use rand::Rng;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Draw each delay uniformly from `[0, backoff]` instead of sleeping the
    /// full backoff.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Un-jittered backoff before retry number `attempt` (1-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        self.base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }

    /// Delay to sleep before retry number `attempt`, honouring a
    /// server-supplied `Retry-After` as a lower bound.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let backoff = self.backoff_ms(attempt);
        let mut delay = if self.jitter && backoff > 0 {
            rand::thread_rng().gen_range(0..=backoff)
        } else {
            backoff
        };
        if let Some(secs) = retry_after_secs {
            delay = delay.max(secs.saturating_mul(1000));
        }
        Duration::from_millis(delay)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Returns the final result together with the number of attempts made
    /// (at least 1).
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T, ExtractError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExtractError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    let retry_after = match &e {
                        ExtractError::Provider(p) => p.retry_after_secs(),
                        _ => None,
                    };
                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        "{}: attempt {} failed: {}; retry {}/{} in {}ms",
                        label,
                        attempt,
                        e,
                        attempt,
                        self.max_retries,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, SchemaViolationError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff_ms: 1,
            max_backoff_ms: 4,
            jitter: false,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(p.backoff_ms(0), 0);
        assert_eq!(p.backoff_ms(1), 500);
        assert_eq!(p.backoff_ms(2), 1_000);
        assert_eq!(p.backoff_ms(3), 2_000);
        assert_eq!(p.backoff_ms(10), 8_000);
        assert_eq!(p.backoff_ms(200), 8_000);
    }

    #[test]
    fn jittered_delay_stays_within_backoff() {
        let p = RetryPolicy::default();
        for _ in 0..100 {
            assert!(p.delay_for(2, None) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn retry_after_is_a_floor() {
        let p = RetryPolicy::default();
        assert!(p.delay_for(1, Some(3)) >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, attempts) = fast(2)
            .run("item", move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExtractError::Provider(ProviderError::Http {
                        status: 503,
                        body: String::new(),
                    }))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, attempts) = fast(2)
            .run("item", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ExtractError::Provider(ProviderError::EmptyResponse))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn schema_violations_are_not_retried() {
        let (result, attempts) = fast(5)
            .run("item", |_| async {
                Err::<(), _>(ExtractError::SchemaViolation(SchemaViolationError::QualityMustBeNul {
                    found: "good".into(),
                }))
            })
            .await;
        assert!(matches!(result, Err(ExtractError::SchemaViolation(_))));
        assert_eq!(attempts, 1);
    }
}
