//! # Stratus Config
//!
//! Every on-disk config (tiling, schedulers, archive, retention, legends,
//! attribution) loads through the same pattern: resolve the path (explicit
//! arg → env var → config-dir default), `stat` it, key a small LRU cache by
//! `(path, mtime_ns, size)`, parse and validate a strongly typed record,
//! and expose `{etag, parsed, raw}` where the ETag is `"sha256-<hex>"` of
//! the raw bytes. Consumers trust the ETag for HTTP 304 handling.

#![warn(clippy::all)]

pub mod archive;
pub mod attribution;
pub mod cache;
pub mod ecmwf;
pub mod error;
pub mod legend;
pub mod paths;
pub mod retention;
pub mod scheduler;
pub mod tile_scheduler;
pub mod tiling;

pub use cache::{compute_etag, Payload, PayloadCache};
pub use error::{Error, Result};

/// The closed set of schema versions this build understands.
pub const SUPPORTED_SCHEMA_VERSIONS: [u32; 1] = [1];

/// Validate a `schema_version` field against the supported set.
pub fn check_schema_version(kind: &str, version: u32) -> Result<()> {
    if !SUPPORTED_SCHEMA_VERSIONS.contains(&version) {
        return Err(Error::config(format!(
            "unsupported {kind} schema_version={version}; supported versions: {SUPPORTED_SCHEMA_VERSIONS:?}"
        )));
    }
    Ok(())
}
