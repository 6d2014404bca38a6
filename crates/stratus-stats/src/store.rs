//! On-disk layout for statistics artifacts
//!
//! One artifact per `(source, variable, window_kind, window_key, version)`:
//! a dataset file plus a JSON metadata side-car under
//! `{root}/{source}/{variable}/{kind}/{key}/{version}/`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::windows::WindowKind;

const DATASET_FILENAME: &str = "statistics.nc";
const METADATA_FILENAME: &str = "statistics.meta.json";

/// Resolved paths of one statistics artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsArtifact {
    pub dataset_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Metadata side-car persisted next to each dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub source: String,
    pub variable: String,
    pub window_kind: WindowKind,
    pub window_key: String,
    pub version: String,
    pub sample_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Statistics artifact store rooted at a directory.
pub struct StatisticsStore {
    root: PathBuf,
}

impl StatisticsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the artifact paths for a statistics key. Components must be
    /// plain path segments; anything that could traverse outside the root
    /// is rejected.
    pub fn resolve_paths(
        &self,
        source: &str,
        variable: &str,
        window_kind: WindowKind,
        window_key: &str,
        version: &str,
    ) -> Result<StatisticsArtifact> {
        let dir = self
            .root
            .join(safe_component("source", source)?)
            .join(safe_component("variable", variable)?)
            .join(window_kind.as_str())
            .join(safe_component("window_key", window_key)?)
            .join(safe_component("version", version)?);
        Ok(StatisticsArtifact {
            dataset_path: dir.join(DATASET_FILENAME),
            metadata_path: dir.join(METADATA_FILENAME),
        })
    }

    /// Persist the metadata side-car, creating parent directories.
    pub fn write_metadata(
        &self,
        artifact: &StatisticsArtifact,
        metadata: &ArtifactMetadata,
    ) -> Result<()> {
        if let Some(parent) = artifact.metadata_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(metadata)?;
        std::fs::write(&artifact.metadata_path, body)?;
        Ok(())
    }

    /// Load the metadata side-car of an artifact.
    pub fn read_metadata(&self, artifact: &StatisticsArtifact) -> Result<ArtifactMetadata> {
        let body = std::fs::read(&artifact.metadata_path)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn safe_component<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_argument(format!("{name} must not be empty")));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(Error::invalid_argument(format!(
            "{name} must not traverse directories: {value:?}"
        )));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains("..") {
        return Err(Error::invalid_argument(format!(
            "{name} must be a plain path segment: {value:?}"
        )));
    }
    Ok(trimmed)
}
