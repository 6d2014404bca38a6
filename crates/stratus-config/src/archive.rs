//! Archive config (`archive.yaml`)

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::check_schema_version;
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;

pub const DEFAULT_ARCHIVE_CONFIG_NAME: &str = "archive.yaml";
pub const ARCHIVE_CONFIG_ENV: &str = "DIGITAL_EARTH_ARCHIVE_CONFIG";

/// Archive configuration: raw-run root, keep policy and manifest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ArchiveConfig {
    pub schema_version: u32,
    pub raw_root_dir: PathBuf,
    pub keep_n_runs: usize,
    pub checksum_algorithm: String,
    pub manifest_filename: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            raw_root_dir: PathBuf::from("data/raw"),
            keep_n_runs: 5,
            checksum_algorithm: "sha256".to_string(),
            manifest_filename: "manifest.json".to_string(),
        }
    }
}

impl ArchiveConfig {
    fn validate(mut self) -> Result<Self> {
        check_schema_version("archive", self.schema_version)?;

        let algorithm = self.checksum_algorithm.trim().to_ascii_lowercase();
        if algorithm != "sha256" {
            return Err(Error::config(format!(
                "unsupported checksum_algorithm {:?}; expected \"sha256\"",
                self.checksum_algorithm
            )));
        }
        self.checksum_algorithm = algorithm;

        let name = self.manifest_filename.trim();
        if name.is_empty() {
            return Err(Error::config("manifest_filename must not be empty"));
        }
        let candidate = Path::new(name);
        let traverses = candidate.is_absolute()
            || candidate
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if traverses {
            return Err(Error::config(format!(
                "manifest_filename must be a relative filename: {name:?}"
            )));
        }
        self.manifest_filename = name.to_string();

        Ok(self)
    }
}

/// Parse and validate archive YAML.
pub fn parse_archive_config(raw: &[u8]) -> Result<ArchiveConfig> {
    let config: ArchiveConfig = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid archive config: {e}")))?;
    config.validate()
}

fn cache() -> &'static PayloadCache<ArchiveConfig> {
    static CACHE: OnceLock<PayloadCache<ArchiveConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(8))
}

/// Load the archive config, cached by file identity.
pub fn get_archive_config(path: Option<&Path>) -> Result<Payload<ArchiveConfig>> {
    let resolved = resolve_config_path(path, ARCHIVE_CONFIG_ENV, DEFAULT_ARCHIVE_CONFIG_NAME);
    cache().get_or_load(&resolved, parse_archive_config)
}

/// Drop cached archive payloads.
pub fn clear_archive_config_cache() {
    cache().clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_archive_config(b"{}").unwrap();
        assert_eq!(config.keep_n_runs, 5);
        assert_eq!(config.checksum_algorithm, "sha256");
        assert_eq!(config.manifest_filename, "manifest.json");
    }

    #[test]
    fn test_checksum_normalized() {
        let config = parse_archive_config(b"checksum_algorithm: SHA256").unwrap();
        assert_eq!(config.checksum_algorithm, "sha256");
        assert!(parse_archive_config(b"checksum_algorithm: md5").is_err());
    }

    #[test]
    fn test_manifest_filename_safety() {
        assert!(parse_archive_config(b"manifest_filename: ../evil.json").is_err());
        assert!(parse_archive_config(b"manifest_filename: /abs.json").is_err());
        assert!(parse_archive_config(b"manifest_filename: \"\"").is_err());
        assert!(parse_archive_config(b"manifest_filename: runs/manifest.json").is_ok());
    }
}
