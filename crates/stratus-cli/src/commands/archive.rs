use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use stratus_archive::{generate_manifest, read_manifest, validate_manifest, write_manifest};
use stratus_config::archive::get_archive_config;

use super::print_json;

#[derive(Parser)]
pub struct ArchiveArgs {
    /// Path to archive.yaml (defaults to DIGITAL_EARTH_ARCHIVE_CONFIG /
    /// config/archive.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ArchiveCommand,
}

#[derive(Subcommand)]
pub enum ArchiveCommand {
    /// Generate and write the manifest for a run directory
    Manifest {
        /// Run directory
        #[arg(long)]
        dir: PathBuf,

        /// Run id recorded in the manifest
        #[arg(long)]
        run_id: String,
    },
    /// Validate a run directory against its manifest
    Validate {
        /// Run directory
        #[arg(long)]
        dir: PathBuf,
    },
}

pub async fn execute(args: ArchiveArgs) -> Result<()> {
    let manifest_filename = match get_archive_config(args.config.as_deref()) {
        Ok(payload) => payload.parsed.manifest_filename.clone(),
        // No archive config on disk: fall back to the default filename.
        Err(stratus_config::Error::NotFound(_)) => "manifest.json".to_string(),
        Err(err) => return Err(err).context("cannot load archive config"),
    };

    match args.command {
        ArchiveCommand::Manifest { dir, run_id } => {
            let manifest = generate_manifest(&dir, &run_id, &manifest_filename)
                .context("manifest generation failed")?;
            write_manifest(&dir, &manifest, &manifest_filename)?;
            print_json(&json!({
                "run_id": manifest.run_id,
                "algorithm": manifest.algorithm,
                "files": manifest.files.len(),
                "manifest": dir.join(&manifest_filename),
            }))
        }
        ArchiveCommand::Validate { dir } => {
            let manifest = read_manifest(&dir, &manifest_filename)?;
            let validation = validate_manifest(&dir, &manifest, &manifest_filename)?;
            print_json(&json!(validation))?;
            if !validation.is_valid() {
                bail!(
                    "archive validation failed: {} missing, {} extra, {} modified",
                    validation.missing.len(),
                    validation.extra.len(),
                    validation.modified.len()
                );
            }
            Ok(())
        }
    }
}
