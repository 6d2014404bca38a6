//! Cron-driven ingest loop with a retrying execution envelope
//!
//! The loop sleeps until the next cron fire (UTC), runs the job inside the
//! shared backoff envelope and reschedules. A stop signal is honored at
//! every sleep boundary. There is no catch-up: after a stall or clock jump
//! the next fire is computed from the current time, not from missed ones.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tracing::{error, info, warn};

use stratus_core::ExponentialBackoff;

use crate::error::{Error, Result};

/// Parse a cron expression (UTC). Standard 5-field crontab expressions are
/// accepted by prepending a seconds field of `0`.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_argument("cron must not be empty"));
    }
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| Error::invalid_argument(format!("invalid cron expression {expr:?}: {e}")))
}

/// An idempotent unit of scheduled work.
#[async_trait]
pub trait IngestJob: Send + Sync {
    /// Job name for logging.
    fn name(&self) -> &str;

    /// Execute one iteration.
    async fn run(&self) -> Result<()>;
}

/// Cron scheduler wrapping an [`IngestJob`] in a retry envelope.
pub struct IngestScheduler {
    schedule: Schedule,
    max_retries: u32,
    backoff: ExponentialBackoff,
}

impl IngestScheduler {
    pub fn new(cron_expr: &str, max_retries: u32, backoff: ExponentialBackoff) -> Result<Self> {
        Ok(Self {
            schedule: parse_cron(cron_expr)?,
            max_retries,
            backoff,
        })
    }

    /// Next fire time strictly after `after`.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Run the job once, retrying with backoff. The last error surfaces
    /// after the retries are exhausted.
    pub async fn run_once(&self, job: &dyn IngestJob) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match job.run().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let retries_used = attempts - 1;
                    if retries_used >= self.max_retries {
                        return Err(err);
                    }
                    let retry = retries_used + 1;
                    let delay = self.backoff.delay(retry);
                    warn!(
                        job = job.name(),
                        attempt = attempts,
                        max_retries = self.max_retries,
                        delay_seconds = delay.as_secs_f64(),
                        error = %err,
                        "ingest job failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Run the cron loop until `stop` flips to `true`. A failed iteration
    /// is logged and the loop reschedules; it never aborts the scheduler.
    pub async fn run_forever(&self, job: &dyn IngestJob, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                return;
            }
            let now = Utc::now();
            let Some(next_run) = self.next_run_after(now) else {
                error!(job = job.name(), "cron schedule yields no future fire times");
                return;
            };
            let wait = (next_run - now).to_std().unwrap_or_default();
            info!(
                job = job.name(),
                next_run = %next_run,
                wait_seconds = wait.as_secs_f64(),
                "ingest scheduler sleeping"
            );

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(err) = self.run_once(job).await {
                        error!(job = job.name(), error = %err, "ingest iteration failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl IngestJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(Error::job(format!("failure {call}")))
            } else {
                Ok(())
            }
        }
    }

    fn fast_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            base_seconds: 0.001,
            factor: 2.0,
            max_seconds: 0.001,
        }
    }

    #[test]
    fn test_parse_cron_five_and_six_fields() {
        assert!(parse_cron("0 * * * *").is_ok());
        assert!(parse_cron("*/5 * * * *").is_ok());
        assert!(parse_cron("0 0 3 * * *").is_ok());
        assert!(parse_cron("").is_err());
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn test_next_run_after_hourly() {
        let scheduler =
            IngestScheduler::new("0 * * * *", 0, ExponentialBackoff::default()).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 10, 15, 0).unwrap();
        let next = scheduler.next_run_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_run_once_retries_until_success() {
        let scheduler = IngestScheduler::new("0 * * * *", 3, fast_backoff()).unwrap();
        let job = CountingJob {
            calls: AtomicU32::new(0),
            fail_first: 2,
        };
        scheduler.run_once(&job).await.unwrap();
        assert_eq!(job.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_once_surfaces_last_error() {
        let scheduler = IngestScheduler::new("0 * * * *", 1, fast_backoff()).unwrap();
        let job = CountingJob {
            calls: AtomicU32::new(0),
            fail_first: 10,
        };
        let err = scheduler.run_once(&job).await.unwrap_err();
        assert!(err.to_string().contains("failure 2"));
        assert_eq!(job.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_unblocks_sleep() {
        let scheduler =
            IngestScheduler::new("0 0 1 1 *", 0, ExponentialBackoff::default()).unwrap();
        let job = CountingJob {
            calls: AtomicU32::new(0),
            fail_first: 0,
        };
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            scheduler.run_forever(&job, rx),
        )
        .await
        .expect("stop signal should terminate the loop");
        stopper.await.unwrap();
        assert_eq!(job.calls.load(Ordering::SeqCst), 0);
    }
}
