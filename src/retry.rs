//! Retry of whole runs with exponential backoff.

use crate::config::RetrySettings;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Longest single sleep between cancellation checks.
const CANCELLATION_POLL: Duration = Duration::from_millis(100);

/// Errors that can tell whether trying again may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff bounded by total elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    /// Cap for a single backoff.
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// No retry starts once this much time has passed since the first attempt.
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
            backoff_multiplier: settings.backoff_multiplier,
            max_elapsed: Duration::from_secs(settings.max_elapsed_secs),
        }
    }

    /// Backoff before retry number `retry_count` (0 based):
    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let backoff =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, the
    /// elapsed bound would be exceeded by the next backoff, or `cancellation`
    /// fires. The last error is returned in every failure case.
    ///
    /// Blocks the calling thread while waiting.
    pub fn run<T, E, F>(&self, label: &str, cancellation: &CancellationToken, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Result<T, E>,
    {
        let started = Instant::now();
        let mut retry_count = 0;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }

            let delay = self.backoff(retry_count);
            if started.elapsed() + delay > self.max_elapsed {
                error!(
                    "{} failed after {} attempts in {:?}, giving up: {}",
                    label,
                    retry_count + 1,
                    started.elapsed(),
                    err
                );
                return Err(err);
            }
            warn!(
                "{} failed (attempt {}), retrying in {:?}: {}",
                label,
                retry_count + 1,
                delay,
                err
            );
            if !sleep_unless_cancelled(delay, cancellation) {
                warn!("{} cancelled while waiting to retry", label);
                return Err(err);
            }
            crate::server::metrics::record_retry();
            retry_count += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySettings::default())
    }
}

/// Returns false if cancelled before `delay` passed.
fn sleep_unless_cancelled(delay: Duration, cancellation: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancellation.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCELLATION_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            *self == TestError::Transient
        }
    }

    fn fast_policy(max_elapsed: Duration) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_elapsed,
        }
    }

    #[test]
    fn test_default_matches_settings() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
        assert_eq!(policy.backoff_multiplier, 1.5);
        assert_eq!(policy.max_elapsed, Duration::from_secs(180));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            max_elapsed: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_retries_transient_errors_until_success() {
        let attempts = Cell::new(0);
        let result = fast_policy(Duration::from_secs(5)).run(
            "test",
            &CancellationToken::new(),
            || {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 {
                    Err(TestError::Transient)
                } else {
                    Ok(attempts.get())
                }
            },
        );
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let attempts = Cell::new(0);
        let result: Result<(), _> =
            fast_policy(Duration::from_secs(5)).run("test", &CancellationToken::new(), || {
                attempts.set(attempts.get() + 1);
                Err(TestError::Fatal)
            });
        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_gives_up_after_max_elapsed() {
        let attempts = Cell::new(0);
        let started = Instant::now();
        let result: Result<(), _> = fast_policy(Duration::from_millis(50)).run(
            "test",
            &CancellationToken::new(),
            || {
                attempts.set(attempts.get() + 1);
                Err(TestError::Transient)
            },
        );
        assert_eq!(result, Err(TestError::Transient));
        assert!(attempts.get() > 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_cancellation_stops_retrying() {
        let token = CancellationToken::new();
        token.cancel();
        let attempts = Cell::new(0);
        let result: Result<(), _> = fast_policy(Duration::from_secs(5)).run("test", &token, || {
            attempts.set(attempts.get() + 1);
            Err(TestError::Transient)
        });
        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(attempts.get(), 1);
    }
}
