use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;

use stratus_config::scheduler::get_scheduler_config;
use stratus_core::ExponentialBackoff;
use stratus_scheduler::{
    AlertManager, IngestJob, IngestPipeline, IngestRunStore, IngestScheduler,
};

use super::print_json;

#[derive(Parser)]
pub struct SchedulerArgs {
    /// Path to scheduler.yaml (defaults to DIGITAL_EARTH_SCHEDULER_CONFIG /
    /// config/scheduler.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: SchedulerCommand,
}

#[derive(Subcommand)]
pub enum SchedulerCommand {
    /// Run the cron-driven ingest loop until interrupted
    Run {
        /// Ingest command executed on each fire
        #[arg(long)]
        exec: String,
    },
    /// List recent ingest runs
    Runs {
        /// Maximum runs to print, newest first
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Runs the configured ingest command as a subprocess.
struct ExecJob {
    command: String,
}

#[async_trait::async_trait]
impl IngestJob for ExecJob {
    fn name(&self) -> &str {
        "ingest-exec"
    }

    async fn run(&self) -> stratus_scheduler::Result<()> {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .status()
            .await
            .map_err(|e| stratus_scheduler::Error::job(format!("spawn failed: {e}")))?;
        if !status.success() {
            return Err(stratus_scheduler::Error::job(format!(
                "ingest command exited with {status}"
            )));
        }
        Ok(())
    }
}

pub async fn execute(args: SchedulerArgs) -> Result<()> {
    let payload = get_scheduler_config(args.config.as_deref())
        .context("cannot load scheduler config")?;
    let config = payload.parsed.clone();

    let store = Arc::new(IngestRunStore::new(
        Some(PathBuf::from(&config.runs.storage_path)),
        config.runs.max_entries,
    ));

    match args.command {
        SchedulerCommand::Runs { limit } => {
            let runs = store.list_runs(limit);
            print_json(&json!(runs))
        }
        SchedulerCommand::Run { exec } => {
            if !config.enabled {
                bail!("scheduler is disabled in config (enabled: false)");
            }
            let alert = Arc::new(AlertManager::new(
                config.alert.consecutive_failures,
                config.alert.webhook_url.clone(),
                config.alert.webhook_headers.clone(),
            )?);
            let backoff = ExponentialBackoff {
                base_seconds: config.backoff.base_seconds,
                factor: config.backoff.factor,
                max_seconds: config.backoff.max_seconds,
            };
            let pipeline = IngestPipeline::new(store, alert, config.max_retries, backoff);
            let job = ExecJob { command: exec };

            // The pipeline owns retries and run accounting; the cron loop
            // only drives the cadence.
            struct PipelineJob {
                pipeline: IngestPipeline,
                inner: ExecJob,
            }

            #[async_trait::async_trait]
            impl IngestJob for PipelineJob {
                fn name(&self) -> &str {
                    "ingest"
                }

                async fn run(&self) -> stratus_scheduler::Result<()> {
                    self.pipeline.execute(&self.inner).await.map(|_| ())
                }
            }

            let scheduler = IngestScheduler::new(&config.cron, 0, backoff)?;
            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                let _ = stop_tx.send(true);
            });

            scheduler
                .run_forever(&PipelineJob { pipeline, inner: job }, stop_rx)
                .await;
            Ok(())
        }
    }
}
