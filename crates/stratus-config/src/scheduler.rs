//! Ingest scheduler config (`scheduler.yaml`)

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::check_schema_version;
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;

pub const DEFAULT_SCHEDULER_CONFIG_NAME: &str = "scheduler.yaml";
pub const SCHEDULER_CONFIG_ENV: &str = "DIGITAL_EARTH_SCHEDULER_CONFIG";

/// Retry backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackoffConfig {
    pub base_seconds: f64,
    pub factor: f64,
    pub max_seconds: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_seconds: 1.0,
            factor: 2.0,
            max_seconds: 300.0,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self, context: &str) -> Result<()> {
        if self.base_seconds <= 0.0 {
            return Err(Error::config(format!(
                "{context}.backoff.base_seconds must be > 0"
            )));
        }
        if self.factor <= 1.0 {
            return Err(Error::config(format!(
                "{context}.backoff.factor must be > 1"
            )));
        }
        if self.max_seconds <= 0.0 {
            return Err(Error::config(format!(
                "{context}.backoff.max_seconds must be > 0"
            )));
        }
        Ok(())
    }
}

/// Run-history persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RunsConfig {
    pub storage_path: String,
    pub max_entries: usize,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            storage_path: ".cache/ingest-runs.json".to_string(),
            max_entries: 200,
        }
    }
}

/// Alerting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AlertConfig {
    pub consecutive_failures: u32,
    pub webhook_url: Option<String>,
    pub webhook_headers: BTreeMap<String, String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 3,
            webhook_url: None,
            webhook_headers: BTreeMap::new(),
        }
    }
}

/// Ingest scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub schema_version: u32,
    pub enabled: bool,
    pub cron: String,
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    pub runs: RunsConfig,
    pub alert: AlertConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            enabled: false,
            cron: "0 * * * *".to_string(),
            max_retries: 3,
            backoff: BackoffConfig::default(),
            runs: RunsConfig::default(),
            alert: AlertConfig::default(),
        }
    }
}

impl SchedulerConfig {
    fn validate(self) -> Result<Self> {
        check_schema_version("scheduler", self.schema_version)?;
        if self.cron.trim().is_empty() {
            return Err(Error::config("scheduler.cron must not be empty"));
        }
        self.backoff.validate("scheduler")?;
        if self.runs.max_entries == 0 || self.runs.max_entries > 10_000 {
            return Err(Error::config(
                "scheduler.runs.max_entries must be in 1..=10000",
            ));
        }
        if self.alert.consecutive_failures == 0 {
            return Err(Error::config(
                "scheduler.alert.consecutive_failures must be >= 1",
            ));
        }
        Ok(self)
    }
}

/// Parse and validate scheduler YAML.
pub fn parse_scheduler_config(raw: &[u8]) -> Result<SchedulerConfig> {
    let config: SchedulerConfig = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid scheduler config: {e}")))?;
    config.validate()
}

fn cache() -> &'static PayloadCache<SchedulerConfig> {
    static CACHE: OnceLock<PayloadCache<SchedulerConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(8))
}

/// Load the scheduler config, cached by file identity.
pub fn get_scheduler_config(path: Option<&Path>) -> Result<Payload<SchedulerConfig>> {
    let resolved = resolve_config_path(path, SCHEDULER_CONFIG_ENV, DEFAULT_SCHEDULER_CONFIG_NAME);
    cache().get_or_load(&resolved, parse_scheduler_config)
}

/// Drop cached scheduler payloads.
pub fn clear_scheduler_config_cache() {
    cache().clear()
}
