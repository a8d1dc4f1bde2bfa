//! Retry policy and the sleep seam it runs on.
//!
//! HTTP 429 sleeps a fixed delay and retries. Timeouts, connection failures
//! and 5xx back off exponentially (`base * 2^(attempt-1)`). Anything else
//! fails immediately. All waiting goes through a [`Sleeper`] so tests can use
//! a fake clock.

use super::provider::DataError;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Something that can wait.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Fake clock that records requested sleeps instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// First backoff delay; doubled on every further attempt.
    pub base_delay: Duration,
    /// Fixed wait after an HTTP 429.
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt number `attempt` (1-based, so attempt 2 is the
    /// first retry and waits `base_delay`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(2).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, DataError>
    where
        F: FnMut() -> Result<T, DataError>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if !(e.is_transient() || e.is_rate_limited()) => return Err(e),
                Err(e) if attempt >= max => {
                    if max == 1 {
                        return Err(e);
                    }
                    return Err(DataError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    attempt += 1;
                    let delay = if e.is_rate_limited() {
                        self.rate_limit_delay
                    } else {
                        self.backoff(attempt)
                    };
                    warn!(attempt, max, delay_ms = delay.as_millis() as u64, error = %e, "retrying request");
                    sleeper.sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            rate_limit_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff(2), Duration::from_millis(100));
        assert_eq!(p.backoff(3), Duration::from_millis(200));
        assert_eq!(p.backoff(4), Duration::from_millis(400));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);
        let out = policy().run(&sleeper, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(DataError::ServerError { status: 503 })
            } else {
                Ok(42)
            }
        });
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.get(), 3);
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn rate_limit_uses_fixed_delay() {
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);
        let out = policy().run(&sleeper, || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(DataError::RateLimited)
            } else {
                Ok(())
            }
        });
        assert!(out.is_ok());
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);
        let out: Result<(), _> = policy().run(&sleeper, || {
            calls.set(calls.get() + 1);
            Err(DataError::ClientError { status: 404, body: "not found".into() })
        });
        assert!(matches!(out, Err(DataError::ClientError { status: 404, .. })));
        assert_eq!(calls.get(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn exhaustion_is_reported() {
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);
        let out: Result<(), _> = policy().run(&sleeper, || {
            calls.set(calls.get() + 1);
            Err(DataError::Timeout("slow".into()))
        });
        assert!(matches!(out, Err(DataError::RetriesExhausted { attempts: 4, .. })));
        assert_eq!(calls.get(), 4);
        assert_eq!(sleeper.sleeps().len(), 3);
    }

    #[test]
    fn single_attempt_policy_returns_raw_error() {
        let sleeper = RecordingSleeper::new();
        let out: Result<(), _> =
            RetryPolicy::none().run(&sleeper, || Err(DataError::Timeout("slow".into())));
        assert!(matches!(out, Err(DataError::Timeout(_))));
    }
}
