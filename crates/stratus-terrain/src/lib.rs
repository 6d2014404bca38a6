//! # Stratus Terrain
//!
//! 3-D terrain tiles for the Stratus platform: the quantized-mesh binary
//! encoder (header, delta+zig-zag vertex streams, high-water-mark triangle
//! indices, edge lists), `layer.json` assembly and tileset generation over
//! the terrain tile pyramid.

#![warn(clippy::all)]

pub mod error;
pub mod layer_json;
pub mod mesh;
pub mod tileset;

pub use error::{Error, Result};
pub use layer_json::{build_layer_json, write_layer_json, LayerJson};
pub use mesh::{encode_quantized_mesh, HeightGrid, QuantizedMeshOptions};
pub use tileset::{generate_tileset, HeightSampler, TilesetOptions, TilesetStats};
