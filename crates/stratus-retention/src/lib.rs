//! # Stratus Retention
//!
//! Keep-newest-N cleanup over versioned artifact trees
//! (`{root}/{layer}/{version}/…`). Pinned `(layer, version)` pairs from an
//! external references file are never deleted; every action lands in an
//! append-only JSON-lines audit log keyed by a per-run id.

#![warn(clippy::all)]

pub mod audit;
pub mod cleanup;
pub mod error;
pub mod refs;

pub use audit::{AuditEvent, AuditLogger};
pub use cleanup::{
    run_from_config, run_retention_cleanup, RetentionCleanupResult, RetentionOptions,
};
pub use error::{Error, Result};
pub use refs::{is_pinned, load_tile_references, PinnedReferences};
