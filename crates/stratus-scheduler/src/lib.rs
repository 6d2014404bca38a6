//! # Stratus Scheduler
//!
//! The ingest side of the platform: a durable capped history of ingest
//! runs, a cron-driven scheduler that executes ingest jobs inside a retry
//! envelope, and an alert manager that dispatches a webhook when failures
//! streak past a threshold.

#![warn(clippy::all)]

pub mod alert;
pub mod cron;
pub mod error;
pub mod ingest;
pub mod runs;

pub use alert::{AlertManager, AlertState, WebhookSender};
pub use cron::{parse_cron, IngestJob, IngestScheduler};
pub use error::{Error, Result};
pub use ingest::IngestPipeline;
pub use runs::{IngestRun, IngestRunStatus, IngestRunStore, RunUpdate};
