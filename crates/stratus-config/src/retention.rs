//! Retention config (`retention.yaml`)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::check_schema_version;
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;

pub const DEFAULT_RETENTION_CONFIG_NAME: &str = "retention.yaml";
pub const RETENTION_CONFIG_ENV: &str = "DIGITAL_EARTH_RETENTION_CONFIG";

/// Audit log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionAuditConfig {
    pub log_path: PathBuf,
}

impl Default for RetentionAuditConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(".cache/retention-audit.jsonl"),
        }
    }
}

/// Cron cadence for the retention scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionSchedulerConfig {
    pub cron: String,
    pub max_retries: u32,
}

impl Default for RetentionSchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 3 * * *".to_string(),
            max_retries: 0,
        }
    }
}

/// Retention configuration: versioned tile tree, keep policy and pinned
/// references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionConfig {
    pub schema_version: u32,
    pub tiles_root_dir: PathBuf,
    /// Newest versions kept per layer.
    pub keep_n: usize,
    /// File enumerating pinned (layer, version) pairs.
    pub references_path: PathBuf,
    pub audit: RetentionAuditConfig,
    pub scheduler: RetentionSchedulerConfig,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            tiles_root_dir: PathBuf::from("data/tiles"),
            keep_n: 3,
            references_path: PathBuf::from("config/tiles-references.yaml"),
            audit: RetentionAuditConfig::default(),
            scheduler: RetentionSchedulerConfig::default(),
        }
    }
}

impl RetentionConfig {
    fn validate(self) -> Result<Self> {
        check_schema_version("retention", self.schema_version)?;
        if self.scheduler.cron.trim().is_empty() {
            return Err(Error::config("retention.scheduler.cron must not be empty"));
        }
        Ok(self)
    }
}

/// Parse and validate retention YAML.
pub fn parse_retention_config(raw: &[u8]) -> Result<RetentionConfig> {
    let config: RetentionConfig = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid retention config: {e}")))?;
    config.validate()
}

fn cache() -> &'static PayloadCache<RetentionConfig> {
    static CACHE: OnceLock<PayloadCache<RetentionConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(8))
}

/// Load the retention config, cached by file identity.
pub fn get_retention_config(path: Option<&Path>) -> Result<Payload<RetentionConfig>> {
    let resolved = resolve_config_path(path, RETENTION_CONFIG_ENV, DEFAULT_RETENTION_CONFIG_NAME);
    cache().get_or_load(&resolved, parse_retention_config)
}

/// Drop cached retention payloads.
pub fn clear_retention_config_cache() {
    cache().clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_retention_config(b"{}").unwrap();
        assert_eq!(config.keep_n, 3);
        assert_eq!(config.scheduler.max_retries, 0);
    }

    #[test]
    fn test_full_config() {
        let yaml = "\
schema_version: 1
tiles_root_dir: /srv/tiles
keep_n: 10
references_path: /etc/stratus/references.yaml
audit:
  log_path: /var/log/stratus/retention.jsonl
scheduler:
  cron: \"0 4 * * *\"
  max_retries: 2
";
        let config = parse_retention_config(yaml.as_bytes()).unwrap();
        assert_eq!(config.tiles_root_dir, PathBuf::from("/srv/tiles"));
        assert_eq!(config.keep_n, 10);
        assert_eq!(config.scheduler.max_retries, 2);
    }

    #[test]
    fn test_rejects_blank_cron() {
        assert!(parse_retention_config(b"scheduler: {cron: \" \"}").is_err());
    }
}
