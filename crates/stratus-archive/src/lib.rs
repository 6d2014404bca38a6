//! # Stratus Archive
//!
//! SHA-256 manifests for archived run directories: generation over a
//! directory walk, plus validation reporting missing, extra and modified
//! files.

#![warn(clippy::all)]

pub mod error;
pub mod manifest;

pub use error::{Error, Result};
pub use manifest::{
    generate_manifest, read_manifest, validate_manifest, write_manifest, Manifest,
    ManifestEntry, ManifestValidation,
};
