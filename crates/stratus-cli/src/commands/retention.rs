use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;

use stratus_config::retention::get_retention_config;
use stratus_core::ExponentialBackoff;
use stratus_retention::cleanup::run_from_config;
use stratus_scheduler::{IngestJob, IngestScheduler};

use super::print_json;

#[derive(Parser)]
pub struct RetentionArgs {
    /// Path to retention.yaml (defaults to DIGITAL_EARTH_RETENTION_CONFIG /
    /// config/retention.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: RetentionCommand,
}

#[derive(Subcommand)]
pub enum RetentionCommand {
    /// Run a single cleanup pass and exit
    Cleanup {
        /// Compute the plan without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Run cleanup on a cron schedule (UTC)
    Run {
        /// Override the configured cron expression
        #[arg(long)]
        cron: Option<String>,

        /// Retry a failed cleanup up to N times
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

struct CleanupJob {
    config_path: Option<PathBuf>,
}

#[async_trait::async_trait]
impl IngestJob for CleanupJob {
    fn name(&self) -> &str {
        "retention-cleanup"
    }

    async fn run(&self) -> stratus_scheduler::Result<()> {
        // Reload config each fire so edits take effect without restart.
        let payload = get_retention_config(self.config_path.as_deref())
            .map_err(|e| stratus_scheduler::Error::job(e.to_string()))?;
        run_from_config(&payload.parsed, false)
            .map_err(|e| stratus_scheduler::Error::job(e.to_string()))?;
        Ok(())
    }
}

pub async fn execute(args: RetentionArgs) -> Result<()> {
    match args.command {
        RetentionCommand::Cleanup { dry_run } => {
            let payload = get_retention_config(args.config.as_deref())
                .context("cannot load retention config")?;
            let result = run_from_config(&payload.parsed, dry_run)
                .context("retention cleanup failed")?;
            print_json(&json!(result))
        }
        RetentionCommand::Run { cron, max_retries } => {
            let payload = get_retention_config(args.config.as_deref())
                .context("cannot load retention config")?;
            let cron = cron.unwrap_or_else(|| payload.parsed.scheduler.cron.clone());
            let max_retries = max_retries.unwrap_or(payload.parsed.scheduler.max_retries);

            let scheduler =
                IngestScheduler::new(&cron, max_retries, ExponentialBackoff::default())?;
            let job = CleanupJob {
                config_path: args.config.clone(),
            };

            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                let _ = stop_tx.send(true);
            });

            scheduler.run_forever(&job, stop_rx).await;
            Ok(())
        }
    }
}
