//! # Stratus Core
//!
//! Foundational primitives for the Stratus weather platform:
//!
//! - **Grid projections**: EPSG:4326 and Web-Mercator raster tile index math
//! - **Terrain tile pyramid**: TMS tiles (2×1 root) covering a rectangle
//!   across a zoom range, plus `available`-range descriptors for `layer.json`
//! - **Retry envelope**: exponential backoff shared by the tile and ingest
//!   schedulers

#![warn(clippy::all)]

pub mod error;
pub mod proj;
pub mod pyramid;
pub mod rect;
pub mod retry;

pub use error::{Error, Result};
pub use pyramid::{TileId, TileRange};
pub use rect::GeoRect;
pub use retry::ExponentialBackoff;
