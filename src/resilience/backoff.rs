//! Retry policy for membership delivery.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Bounded retries with exponential backoff and up to 10% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one. Never less than one.
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_millis(2_000))
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base,
            max,
        }
    }

    /// Wait before retry number `retry` (1 is the first retry, 0 never waits).
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(retry - 1);
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_ms = (capped.as_millis() / 10) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };

        capped + jitter
    }

    /// Run `attempt` until it succeeds or the policy is used up.
    ///
    /// Returns the error of the last try.
    pub async fn run<T, E, F, Fut>(&self, destination: impl Display, mut attempt: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tries += 1;
                    tracing::debug!(destination = %destination, attempt = tries, error = %e, "Attempt failed");
                    if tries >= self.attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(self.delay(tries)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(policy.delay(0), Duration::ZERO);

        let first = policy.delay(1).as_millis();
        assert!((100..110).contains(&first));
        assert!(policy.delay(2).as_millis() >= 200);

        let capped = policy.delay(30).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).attempts, 1);
    }

    #[tokio::test]
    async fn test_run_stops_after_last_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = policy
            .run("peer", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("refused".to_string()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "refused");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_returns_first_success() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let value: Result<u32, String> = policy
            .run("peer", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("flaky".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(value.unwrap(), 1);
    }
}
