//! Bounded-concurrency tile scheduler
//!
//! Jobs fan out over a dedicated rayon pool; per-job retries live inside
//! the worker, so every job resolves to a result value and the scheduler
//! only aggregates. No ordering is guaranteed across workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::worker::{JobStatus, TileJob, TileJobResult, TileWorker};

/// Aggregated outcome of one scheduler run.
#[derive(Debug, Serialize)]
pub struct TileSchedulerSummary {
    pub run_id: String,
    pub total_jobs: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub duration_s: f64,
    pub results: Vec<TileJobResult>,
}

/// Runs tile jobs on a bounded worker pool.
pub struct TileScheduler {
    max_workers: usize,
    progress_log_every: u64,
}

impl TileScheduler {
    /// Create a scheduler with `max_workers` ∈ [1, 128] parallel workers,
    /// logging progress every `progress_log_every` completions.
    pub fn new(max_workers: usize, progress_log_every: u64) -> Result<Self> {
        if !(1..=128).contains(&max_workers) {
            return Err(Error::invalid_argument(format!(
                "max_workers must be in 1..=128, got {max_workers}"
            )));
        }
        if progress_log_every == 0 {
            return Err(Error::invalid_argument("progress_log_every must be > 0"));
        }
        Ok(Self {
            max_workers,
            progress_log_every,
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every job to completion and aggregate the results.
    pub fn run(
        &self,
        run_id: &str,
        jobs: Vec<TileJob>,
        worker: &dyn TileWorker,
    ) -> Result<TileSchedulerSummary> {
        let total = jobs.len();
        if total == 0 {
            return Ok(TileSchedulerSummary {
                run_id: run_id.to_string(),
                total_jobs: 0,
                succeeded: 0,
                failed: 0,
                duration_s: 0.0,
                results: Vec::new(),
            });
        }

        let started = Instant::now();
        info!(
            run_id,
            total_jobs = total,
            max_workers = self.max_workers,
            max_retries = worker.max_retries(),
            "tile scheduler started"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| Error::storage(format!("failed to build worker pool: {e}")))?;

        let completed = AtomicU64::new(0);
        let succeeded = AtomicU64::new(0);
        let failed = AtomicU64::new(0);
        let results: Mutex<Vec<TileJobResult>> = Mutex::new(Vec::with_capacity(total));

        pool.install(|| {
            jobs.par_iter().for_each(|job| {
                let result = worker.process(job);
                match result.status {
                    JobStatus::Success => succeeded.fetch_add(1, Ordering::Relaxed),
                    JobStatus::Failed => failed.fetch_add(1, Ordering::Relaxed),
                };
                results.lock().expect("results poisoned").push(result);

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done == total as u64 || done % self.progress_log_every == 0 {
                    info!(
                        run_id,
                        completed = done,
                        total_jobs = total,
                        succeeded = succeeded.load(Ordering::Relaxed),
                        failed = failed.load(Ordering::Relaxed),
                        "tile scheduler progress"
                    );
                }
            });
        });

        let summary = TileSchedulerSummary {
            run_id: run_id.to_string(),
            total_jobs: total,
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            duration_s: started.elapsed().as_secs_f64(),
            results: results.into_inner().expect("results poisoned"),
        };
        info!(
            run_id,
            total_jobs = summary.total_jobs,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_s = summary.duration_s,
            "tile scheduler finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FlakyWorker {
        calls: AtomicUsize,
        fail_variable: String,
    }

    impl TileWorker for FlakyWorker {
        fn process(&self, job: &TileJob) -> TileJobResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failed = job.variable == self.fail_variable;
            TileJobResult {
                job: job.clone(),
                status: if failed { JobStatus::Failed } else { JobStatus::Success },
                attempts: 1,
                error: failed.then(|| "render failed".to_string()),
                metadata: serde_json::Map::new(),
            }
        }

        fn max_retries(&self) -> u32 {
            0
        }
    }

    fn job(variable: &str) -> TileJob {
        TileJob {
            run_id: "r1".to_string(),
            variable: variable.to_string(),
            level: "sfc".to_string(),
            time: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_scheduler_aggregates_results() {
        let worker = FlakyWorker {
            calls: AtomicUsize::new(0),
            fail_variable: "bad".to_string(),
        };
        let scheduler = TileScheduler::new(4, 2).unwrap();
        let jobs = vec![job("t2m"), job("bad"), job("wind_speed"), job("tp")];
        let summary = scheduler.run("r1", jobs, &worker).unwrap();

        assert_eq!(summary.total_jobs, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.results.len(), 4);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 4);
        assert!(summary.duration_s >= 0.0);

        let failed: Vec<_> = summary
            .results
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job.variable, "bad");
    }

    #[test]
    fn test_empty_run() {
        let worker = FlakyWorker {
            calls: AtomicUsize::new(0),
            fail_variable: String::new(),
        };
        let scheduler = TileScheduler::new(2, 1).unwrap();
        let summary = scheduler.run("r1", Vec::new(), &worker).unwrap();
        assert_eq!(summary.total_jobs, 0);
        assert_eq!(summary.duration_s, 0.0);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scheduler_validation() {
        assert!(TileScheduler::new(0, 1).is_err());
        assert!(TileScheduler::new(129, 1).is_err());
        assert!(TileScheduler::new(1, 0).is_err());
        assert!(TileScheduler::new(128, 1).is_ok());
    }
}
