//! Keep-newest-N retention cleanup
//!
//! The artifact tree is `{root}/{layer}/{version}/…` with version names
//! sorting newest-first in descending order. Each layer keeps its newest
//! `keep_n` versions; older ones are deleted newest-to-oldest, except
//! pinned versions, which persist regardless of age. A dry run computes
//! the full plan without touching the filesystem.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map};
use tracing::{info, warn};

use stratus_config::retention::RetentionConfig;

use crate::audit::AuditLogger;
use crate::error::{Error, Result};
use crate::refs::{is_pinned, load_tile_references, PinnedReferences};

/// Options for one cleanup pass.
#[derive(Debug, Clone, Copy)]
pub struct RetentionOptions {
    /// Newest versions kept per layer.
    pub keep_n: usize,
    /// Compute the plan without deleting.
    pub dry_run: bool,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionCleanupResult {
    pub run_id: String,
    pub dry_run: bool,
    pub layers_scanned: usize,
    pub versions_kept: usize,
    pub versions_deleted: usize,
    pub pinned_skipped: usize,
    /// `(layer, version)` pairs deleted (or planned, in a dry run).
    pub deleted: Vec<(String, String)>,
    pub errors: Vec<String>,
}

fn subdirectories(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Run one cleanup pass over `root`, auditing every action under a fresh
/// run id.
pub fn run_retention_cleanup(
    root: &Path,
    refs: &PinnedReferences,
    audit: &AuditLogger,
    options: &RetentionOptions,
) -> Result<RetentionCleanupResult> {
    if !root.is_dir() {
        return Err(Error::invalid_argument(format!(
            "retention root is not a directory: {}",
            root.display()
        )));
    }

    let run_id = audit.new_run_id();
    let mut result = RetentionCleanupResult {
        run_id: run_id.clone(),
        dry_run: options.dry_run,
        layers_scanned: 0,
        versions_kept: 0,
        versions_deleted: 0,
        pinned_skipped: 0,
        deleted: Vec::new(),
        errors: Vec::new(),
    };

    let mut layers = subdirectories(root)?;
    layers.sort();

    for layer in &layers {
        let layer_dir = root.join(layer);
        let mut versions = subdirectories(&layer_dir)?;
        // Version names sort newest-first in descending order.
        versions.sort_by(|a, b| b.cmp(a));
        result.layers_scanned += 1;

        let mut payload = Map::new();
        payload.insert("layer".to_string(), json!(layer));
        payload.insert("versions".to_string(), json!(versions.len()));
        audit.record("scan", &run_id, payload)?;

        let keep: Vec<&String> = versions.iter().take(options.keep_n).collect();
        let doomed: Vec<&String> = versions.iter().skip(options.keep_n).collect();
        result.versions_kept += keep.len();

        let mut payload = Map::new();
        payload.insert("layer".to_string(), json!(layer));
        payload.insert("keep".to_string(), json!(keep));
        payload.insert("delete".to_string(), json!(doomed));
        payload.insert("dry_run".to_string(), json!(options.dry_run));
        audit.record("plan", &run_id, payload)?;

        for version in doomed {
            if is_pinned(refs, layer, version) {
                result.pinned_skipped += 1;
                let mut payload = Map::new();
                payload.insert("layer".to_string(), json!(layer));
                payload.insert("version".to_string(), json!(version));
                audit.record("skip_pin", &run_id, payload)?;
                continue;
            }

            result.deleted.push((layer.clone(), version.clone()));
            if options.dry_run {
                continue;
            }
            let version_dir = layer_dir.join(version);
            match std::fs::remove_dir_all(&version_dir) {
                Ok(()) => {
                    result.versions_deleted += 1;
                    let mut payload = Map::new();
                    payload.insert("layer".to_string(), json!(layer));
                    payload.insert("version".to_string(), json!(version));
                    audit.record("delete", &run_id, payload)?;
                }
                Err(err) => {
                    warn!(layer, version, error = %err, "retention delete failed");
                    result.errors.push(format!("{layer}/{version}: {err}"));
                    let mut payload = Map::new();
                    payload.insert("layer".to_string(), json!(layer));
                    payload.insert("version".to_string(), json!(version));
                    payload.insert("error".to_string(), json!(err.to_string()));
                    audit.record("error", &run_id, payload)?;
                }
            }
        }
    }

    let mut payload = Map::new();
    payload.insert("layers_scanned".to_string(), json!(result.layers_scanned));
    payload.insert("versions_deleted".to_string(), json!(result.versions_deleted));
    payload.insert("pinned_skipped".to_string(), json!(result.pinned_skipped));
    payload.insert("dry_run".to_string(), json!(options.dry_run));
    audit.record("complete", &run_id, payload)?;

    info!(
        run_id = %result.run_id,
        layers = result.layers_scanned,
        deleted = result.versions_deleted,
        pinned_skipped = result.pinned_skipped,
        dry_run = result.dry_run,
        "retention cleanup complete"
    );
    Ok(result)
}

/// Run a cleanup pass from a [`RetentionConfig`].
pub fn run_from_config(
    config: &RetentionConfig,
    dry_run: bool,
) -> Result<RetentionCleanupResult> {
    let refs = load_tile_references(&config.references_path)?;
    let audit = AuditLogger::new(&config.audit.log_path);
    run_retention_cleanup(
        &config.tiles_root_dir,
        &refs,
        &audit,
        &RetentionOptions {
            keep_n: config.keep_n,
            dry_run,
        },
    )
}
