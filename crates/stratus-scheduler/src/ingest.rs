//! Pipeline glue: run records + retrying execution + alerting
//!
//! One ingest iteration creates a `running` record, executes the job with
//! per-attempt backoff, finalizes the record and feeds the outcome to the
//! alert manager.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use stratus_core::ExponentialBackoff;

use crate::alert::AlertManager;
use crate::cron::IngestJob;
use crate::error::Result;
use crate::runs::{IngestRun, IngestRunStatus, IngestRunStore, RunUpdate};

/// Executes ingest jobs with full run accounting.
pub struct IngestPipeline {
    store: Arc<IngestRunStore>,
    alert: Arc<AlertManager>,
    max_retries: u32,
    backoff: ExponentialBackoff,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<IngestRunStore>,
        alert: Arc<AlertManager>,
        max_retries: u32,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            store,
            alert,
            max_retries,
            backoff,
        }
    }

    /// Run one ingest iteration and return the finalized run record.
    pub async fn execute(&self, job: &dyn IngestJob) -> Result<IngestRun> {
        let run = self.store.create_run()?;
        info!(job = job.name(), run_id = %run.run_id, "ingest run started");

        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;
            match job.run().await {
                Ok(()) => break Ok(()),
                Err(err) => {
                    let retries_used = attempts - 1;
                    if retries_used >= self.max_retries {
                        break Err(err);
                    }
                    let delay = self.backoff.delay(retries_used + 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        };

        let update = match &outcome {
            Ok(()) => RunUpdate {
                status: Some(IngestRunStatus::Success),
                end_time: Some(Utc::now()),
                attempts: Some(attempts),
                ..RunUpdate::default()
            },
            Err(err) => RunUpdate {
                status: Some(IngestRunStatus::Failed),
                end_time: Some(Utc::now()),
                error: Some(err.to_string()),
                attempts: Some(attempts),
            },
        };
        let finalized = self.store.update_run(&run.run_id, update)?;

        match finalized.status {
            IngestRunStatus::Success => {
                info!(job = job.name(), run_id = %finalized.run_id, attempts, "ingest run succeeded")
            }
            _ => {
                error!(
                    job = job.name(),
                    run_id = %finalized.run_id,
                    attempts,
                    error = finalized.error.as_deref().unwrap_or(""),
                    "ingest run failed"
                )
            }
        }
        self.alert.record_run(&finalized).await;
        Ok(finalized)
    }
}
