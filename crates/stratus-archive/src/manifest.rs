//! Manifest generation and validation
//!
//! The manifest lists every file under a run directory with its POSIX
//! relative path, size and SHA-256, excluding the manifest file itself.
//! Validation re-hashes the directory and reports the differences.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// POSIX-style path relative to the run directory.
    pub relative_path: String,
    pub size: u64,
    pub sha256: String,
}

/// A run-directory manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    /// Always `"sha256"`; the only supported algorithm.
    pub algorithm: String,
    pub files: Vec<ManifestEntry>,
}

/// Differences found by [`validate_manifest`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestValidation {
    /// Listed in the manifest, absent on disk.
    pub missing: Vec<String>,
    /// Present on disk, not listed.
    pub extra: Vec<String>,
    /// Present with a different size or checksum.
    pub modified: Vec<String>,
}

impl ManifestValidation {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.modified.is_empty()
    }
}

fn check_manifest_filename(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_argument("manifest filename must not be empty"));
    }
    let candidate = Path::new(trimmed);
    let traverses = candidate.is_absolute()
        || candidate
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if traverses {
        return Err(Error::invalid_argument(format!(
            "manifest filename must be relative and non-traversing: {name:?}"
        )));
    }
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn relative_posix(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::invalid_argument(format!("path escapes run directory: {}", path.display()))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn walk_files(dir: &Path, exclude: &str) -> Result<BTreeMap<String, u64>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = relative_posix(dir, entry.path())?;
        if relative == exclude {
            continue;
        }
        files.insert(relative, entry.metadata().map(|m| m.len()).unwrap_or(0));
    }
    Ok(files)
}

/// Generate a manifest over `dir`, excluding `manifest_filename` itself.
pub fn generate_manifest(dir: &Path, run_id: &str, manifest_filename: &str) -> Result<Manifest> {
    check_manifest_filename(manifest_filename)?;
    if !dir.is_dir() {
        return Err(Error::not_found(format!(
            "run directory not found: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for (relative, size) in walk_files(dir, manifest_filename)? {
        let sha256 = sha256_file(&dir.join(relative.replace('/', std::path::MAIN_SEPARATOR_STR)))?;
        files.push(ManifestEntry {
            relative_path: relative,
            size,
            sha256,
        });
    }

    info!(run_id, files = files.len(), dir = %dir.display(), "generated manifest");
    Ok(Manifest {
        run_id: run_id.to_string(),
        created_at: Utc::now(),
        algorithm: "sha256".to_string(),
        files,
    })
}

/// Write a manifest into its run directory as `manifest_filename`.
pub fn write_manifest(dir: &Path, manifest: &Manifest, manifest_filename: &str) -> Result<()> {
    check_manifest_filename(manifest_filename)?;
    let path = dir.join(manifest_filename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(manifest)?;
    std::fs::write(path, body)?;
    Ok(())
}

/// Read a manifest back from a run directory.
pub fn read_manifest(dir: &Path, manifest_filename: &str) -> Result<Manifest> {
    check_manifest_filename(manifest_filename)?;
    let path = dir.join(manifest_filename);
    let body = std::fs::read(&path)
        .map_err(|_| Error::not_found(format!("manifest not found: {}", path.display())))?;
    Ok(serde_json::from_slice(&body)?)
}

/// Re-hash `dir` against `manifest`, reporting missing, extra and modified
/// files. The manifest file itself is excluded.
pub fn validate_manifest(
    dir: &Path,
    manifest: &Manifest,
    manifest_filename: &str,
) -> Result<ManifestValidation> {
    check_manifest_filename(manifest_filename)?;
    if !dir.is_dir() {
        return Err(Error::not_found(format!(
            "run directory not found: {}",
            dir.display()
        )));
    }

    let on_disk = walk_files(dir, manifest_filename)?;
    let mut validation = ManifestValidation::default();

    for entry in &manifest.files {
        match on_disk.get(&entry.relative_path) {
            None => validation.missing.push(entry.relative_path.clone()),
            Some(&size) => {
                let path = dir.join(
                    entry
                        .relative_path
                        .replace('/', std::path::MAIN_SEPARATOR_STR),
                );
                if size != entry.size || sha256_file(&path)? != entry.sha256 {
                    validation.modified.push(entry.relative_path.clone());
                }
            }
        }
    }

    let listed: BTreeMap<&str, ()> = manifest
        .files
        .iter()
        .map(|e| (e.relative_path.as_str(), ()))
        .collect();
    for relative in on_disk.keys() {
        if !listed.contains_key(relative.as_str()) {
            validation.extra.push(relative.clone());
        }
    }

    Ok(validation)
}
