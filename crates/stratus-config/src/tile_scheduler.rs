//! Tile scheduler config (`tile-scheduler.yaml`)

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::check_schema_version;
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;
use crate::scheduler::BackoffConfig;

pub const DEFAULT_TILE_SCHEDULER_CONFIG_NAME: &str = "tile-scheduler.yaml";
pub const TILE_SCHEDULER_CONFIG_ENV: &str = "DIGITAL_EARTH_TILE_SCHEDULER_CONFIG";

/// Tile scheduler configuration: worker pool size, retry policy and
/// progress logging cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TileSchedulerConfig {
    pub schema_version: u32,
    pub enabled: bool,
    pub max_workers: usize,
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    /// Log progress at most every N completed jobs (1 = every job).
    pub progress_log_every: usize,
}

impl Default for TileSchedulerConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            enabled: false,
            max_workers: 4,
            max_retries: 2,
            backoff: BackoffConfig {
                max_seconds: 60.0,
                ..BackoffConfig::default()
            },
            progress_log_every: 1,
        }
    }
}

impl TileSchedulerConfig {
    fn validate(self) -> Result<Self> {
        check_schema_version("tile scheduler", self.schema_version)?;
        if !(1..=128).contains(&self.max_workers) {
            return Err(Error::config("tile scheduler max_workers must be in 1..=128"));
        }
        if self.max_retries > 50 {
            return Err(Error::config("tile scheduler max_retries must be in 0..=50"));
        }
        if !(1..=10_000).contains(&self.progress_log_every) {
            return Err(Error::config(
                "tile scheduler progress_log_every must be in 1..=10000",
            ));
        }
        self.backoff.validate("tile_scheduler")?;
        Ok(self)
    }
}

/// Parse and validate tile scheduler YAML.
pub fn parse_tile_scheduler_config(raw: &[u8]) -> Result<TileSchedulerConfig> {
    let config: TileSchedulerConfig = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid tile scheduler config: {e}")))?;
    config.validate()
}

fn cache() -> &'static PayloadCache<TileSchedulerConfig> {
    static CACHE: OnceLock<PayloadCache<TileSchedulerConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(8))
}

/// Load the tile scheduler config, cached by file identity.
pub fn get_tile_scheduler_config(path: Option<&Path>) -> Result<Payload<TileSchedulerConfig>> {
    let resolved = resolve_config_path(
        path,
        TILE_SCHEDULER_CONFIG_ENV,
        DEFAULT_TILE_SCHEDULER_CONFIG_NAME,
    );
    cache().get_or_load(&resolved, parse_tile_scheduler_config)
}

/// Drop cached tile scheduler payloads.
pub fn clear_tile_scheduler_config_cache() {
    cache().clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_tile_scheduler_config(b"{}").unwrap();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.progress_log_every, 1);
        assert_eq!(config.backoff.max_seconds, 60.0);
    }

    #[test]
    fn test_worker_bounds() {
        assert!(parse_tile_scheduler_config(b"max_workers: 0").is_err());
        assert!(parse_tile_scheduler_config(b"max_workers: 129").is_err());
        assert!(parse_tile_scheduler_config(b"max_workers: 128").is_ok());
    }

    #[test]
    fn test_retry_bounds() {
        assert!(parse_tile_scheduler_config(b"max_retries: 51").is_err());
        assert!(parse_tile_scheduler_config(b"max_retries: 0").is_ok());
    }

    #[test]
    fn test_progress_bounds() {
        assert!(parse_tile_scheduler_config(b"progress_log_every: 0").is_err());
        assert!(parse_tile_scheduler_config(b"progress_log_every: 10001").is_err());
    }

    #[test]
    fn test_schema_version() {
        assert!(parse_tile_scheduler_config(b"schema_version: 2").is_err());
    }
}
