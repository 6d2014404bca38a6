//! Consecutive-failure alerting with webhook dispatch
//!
//! The manager tracks the failure streak across ingest outcomes. It
//! dispatches exactly once per streak: a webhook failure is logged but does
//! not clear the alerted bit, so only a successful run re-arms alerting.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::runs::{IngestRun, IngestRunStatus};

/// Snapshot of the alerting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertState {
    pub consecutive_failures: u32,
    pub alerted_for_streak: bool,
}

/// Dispatches alert payloads; swapped out in tests.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(
        &self,
        url: &str,
        payload: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Production sender: POST the payload as JSON.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(
        &self,
        url: &str,
        payload: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut request = self.client.post(url).json(payload);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Webhook(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| Error::Webhook(e.to_string()))?;
        Ok(())
    }
}

/// Tracks consecutive ingest failures and alerts past a threshold.
pub struct AlertManager {
    threshold: u32,
    webhook_url: Option<String>,
    webhook_headers: BTreeMap<String, String>,
    sender: Arc<dyn WebhookSender>,
    state: Mutex<AlertState>,
}

impl AlertManager {
    /// Create a manager firing after `threshold` consecutive failures.
    pub fn new(
        threshold: u32,
        webhook_url: Option<String>,
        webhook_headers: BTreeMap<String, String>,
    ) -> Result<Self> {
        Self::with_sender(
            threshold,
            webhook_url,
            webhook_headers,
            Arc::new(HttpWebhookSender::new()),
        )
    }

    /// Create a manager with a custom webhook sender.
    pub fn with_sender(
        threshold: u32,
        webhook_url: Option<String>,
        webhook_headers: BTreeMap<String, String>,
        sender: Arc<dyn WebhookSender>,
    ) -> Result<Self> {
        if threshold == 0 {
            return Err(Error::invalid_argument(
                "consecutive failures threshold must be > 0",
            ));
        }
        let webhook_url = webhook_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(Self {
            threshold,
            webhook_url,
            webhook_headers,
            sender,
            state: Mutex::new(AlertState {
                consecutive_failures: 0,
                alerted_for_streak: false,
            }),
        })
    }

    /// Current state snapshot.
    pub async fn state(&self) -> AlertState {
        *self.state.lock().await
    }

    /// Feed one finished run. Running records are ignored.
    pub async fn record_run(&self, run: &IngestRun) {
        let (should_alert, consecutive) = {
            let mut state = self.state.lock().await;
            match run.status {
                IngestRunStatus::Running => return,
                IngestRunStatus::Success => {
                    state.consecutive_failures = 0;
                    state.alerted_for_streak = false;
                    return;
                }
                IngestRunStatus::Failed => {
                    state.consecutive_failures += 1;
                    let should_alert = state.consecutive_failures >= self.threshold
                        && !state.alerted_for_streak;
                    if should_alert {
                        state.alerted_for_streak = true;
                    }
                    (should_alert, state.consecutive_failures)
                }
            }
        };

        if !should_alert {
            return;
        }

        let Some(url) = &self.webhook_url else {
            warn!(
                threshold = self.threshold,
                consecutive_failures = consecutive,
                run_id = %run.run_id,
                "ingest alert triggered but no webhook configured"
            );
            return;
        };

        let payload = json!({
            "event": "ingest.consecutive_failures",
            "timestamp": Utc::now().to_rfc3339(),
            "threshold": self.threshold,
            "consecutive_failures": consecutive,
            "latest_run": run,
        });

        // A webhook failure does not reset alert state; the streak stays
        // alerted until a success re-arms it.
        if let Err(err) = self.sender.send(url, &payload, &self.webhook_headers).await {
            error!(
                url,
                threshold = self.threshold,
                consecutive_failures = consecutive,
                run_id = %run.run_id,
                error = %err,
                "ingest alert webhook failed"
            );
        }
    }
}
