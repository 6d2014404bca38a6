//! Exponential backoff and the shared retry envelope
//!
//! Both schedulers (tile rendering and ingest) retry failed work with the
//! same policy: `base * factor^(retry - 1)` seconds, capped at `max`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    /// Delay before the first retry, in seconds.
    pub base_seconds: f64,
    /// Multiplier applied per retry.
    pub factor: f64,
    /// Upper bound on any single delay, in seconds.
    pub max_seconds: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_seconds: 1.0,
            factor: 2.0,
            max_seconds: 300.0,
        }
    }
}

impl ExponentialBackoff {
    /// Delay in seconds before retry number `retry` (1-based). Retry number
    /// zero or below yields no delay.
    pub fn delay_seconds(&self, retry: u32) -> f64 {
        if retry == 0 {
            return 0.0;
        }
        let delay = self.base_seconds * self.factor.powi(retry as i32 - 1);
        delay.min(self.max_seconds)
    }

    /// Delay as a [`Duration`] before retry number `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_secs_f64(self.delay_seconds(retry))
    }
}

/// Run `op`, retrying up to `max_retries` times with `backoff` between
/// attempts. The closure receives the 1-based attempt number. Sleeps on the
/// calling thread; async callers should drive the backoff themselves.
pub fn retry_with_backoff<T, E, F>(
    max_retries: u32,
    backoff: &ExponentialBackoff,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> std::result::Result<T, E>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retries_used = attempt - 1;
                if retries_used >= max_retries {
                    return Err(err);
                }
                let retry = retries_used + 1;
                let delay = backoff.delay(retry);
                warn!(
                    attempt,
                    max_retries,
                    delay_seconds = delay.as_secs_f64(),
                    error = %err,
                    "operation failed, retrying"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
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
    fn test_delay_sequence() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay_seconds(0), 0.0);
        assert_eq!(backoff.delay_seconds(1), 1.0);
        assert_eq!(backoff.delay_seconds(2), 2.0);
        assert_eq!(backoff.delay_seconds(3), 4.0);
        assert_eq!(backoff.delay_seconds(10), 300.0); // capped
    }

    #[test]
    fn test_custom_cap() {
        let backoff = ExponentialBackoff {
            base_seconds: 0.5,
            factor: 3.0,
            max_seconds: 2.0,
        };
        assert_eq!(backoff.delay_seconds(1), 0.5);
        assert_eq!(backoff.delay_seconds(2), 1.5);
        assert_eq!(backoff.delay_seconds(3), 2.0);
    }

    #[test]
    fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff {
            base_seconds: 0.0,
            factor: 2.0,
            max_seconds: 0.0,
        };
        let result: Result<u32, String> = retry_with_backoff(3, &backoff, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            if attempt < 3 {
                Err(format!("attempt {attempt} failed"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_exhausts() {
        let backoff = ExponentialBackoff {
            base_seconds: 0.0,
            factor: 2.0,
            max_seconds: 0.0,
        };
        let result: Result<(), String> =
            retry_with_backoff(2, &backoff, |_| Err("boom".to_string()));
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::default();
        let result: Result<(), String> = retry_with_backoff(0, &backoff, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
