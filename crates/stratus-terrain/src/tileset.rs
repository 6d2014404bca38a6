//! Terrain tileset generation over the tile pyramid

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use stratus_core::pyramid::{iter_tile_pyramid, tile_bounds_deg};
use stratus_core::GeoRect;

use crate::error::{Error, Result};
use crate::mesh::{encode_quantized_mesh, HeightGrid, QuantizedMeshOptions};

/// Elevation source sampled when building tile height grids.
pub trait HeightSampler: Send + Sync {
    /// Elevation in meters at `(lon, lat)`.
    fn sample(&self, lon: f64, lat: f64) -> f32;
}

impl<F> HeightSampler for F
where
    F: Fn(f64, f64) -> f32 + Send + Sync,
{
    fn sample(&self, lon: f64, lat: f64) -> f32 {
        self(lon, lat)
    }
}

/// A constant-elevation sampler.
pub struct ConstantHeight(pub f32);

impl HeightSampler for ConstantHeight {
    fn sample(&self, _lon: f64, _lat: f64) -> f32 {
        self.0
    }
}

/// Options for [`generate_tileset`].
#[derive(Debug, Clone, Copy)]
pub struct TilesetOptions {
    pub min_zoom: u32,
    pub max_zoom: u32,
    /// Samples per tile edge.
    pub grid_size: usize,
    pub gzip: bool,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 12,
            grid_size: 65,
            gzip: false,
        }
    }
}

/// Outcome of a tileset generation run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TilesetStats {
    pub tiles_written: u64,
    pub bytes_written: u64,
    pub duration_s: f64,
}

impl TilesetStats {
    pub fn avg_bytes_per_tile(&self) -> f64 {
        if self.tiles_written == 0 {
            0.0
        } else {
            self.bytes_written as f64 / self.tiles_written as f64
        }
    }
}

/// Sample a height grid for one tile. Row 0 sits on the tile's north edge.
pub fn sample_tile_grid(
    sampler: &dyn HeightSampler,
    bounds: &GeoRect,
    grid_size: usize,
) -> Result<HeightGrid> {
    if grid_size < 2 {
        return Err(Error::invalid_argument(format!(
            "grid size must be >= 2, got {grid_size}"
        )));
    }
    let step = 1.0 / (grid_size - 1) as f64;
    let mut values = Vec::with_capacity(grid_size * grid_size);
    for row in 0..grid_size {
        let lat = bounds.north - bounds.height() * (row as f64 * step);
        for col in 0..grid_size {
            let lon = bounds.west + bounds.width() * (col as f64 * step);
            values.push(sampler.sample(lon, lat));
        }
    }
    HeightGrid::new(grid_size, values)
}

/// Generate `{z}/{x}/{y}.terrain` tiles under `out_dir` for every tile of
/// the pyramid covering `rect`.
pub fn generate_tileset(
    sampler: &dyn HeightSampler,
    rect: &GeoRect,
    out_dir: &Path,
    options: &TilesetOptions,
) -> Result<TilesetStats> {
    let started = Instant::now();
    let mesh_options = QuantizedMeshOptions { gzip: options.gzip };

    let mut tiles_written = 0u64;
    let mut bytes_written = 0u64;
    for tile in iter_tile_pyramid(rect, options.min_zoom, options.max_zoom)? {
        let bounds = tile_bounds_deg(tile)?;
        let heights = sample_tile_grid(sampler, &bounds, options.grid_size)?;
        let payload = encode_quantized_mesh(&bounds, &heights, &mesh_options)?;

        let tile_dir = out_dir.join(tile.z.to_string()).join(tile.x.to_string());
        std::fs::create_dir_all(&tile_dir)?;
        let tile_path = tile_dir.join(format!("{}.terrain", tile.y));
        std::fs::write(&tile_path, &payload)?;

        tiles_written += 1;
        bytes_written += payload.len() as u64;
        debug!(tile = %tile, bytes = payload.len(), "wrote terrain tile");
    }

    let stats = TilesetStats {
        tiles_written,
        bytes_written,
        duration_s: started.elapsed().as_secs_f64(),
    };
    info!(
        tiles = stats.tiles_written,
        bytes = stats.bytes_written,
        duration_s = stats.duration_s,
        "terrain tileset complete"
    );
    Ok(stats)
}

/// Count the tiles a run would write, without touching the filesystem.
pub fn planned_tile_count(rect: &GeoRect, min_zoom: u32, max_zoom: u32) -> Result<u64> {
    Ok(iter_tile_pyramid(rect, min_zoom, max_zoom)?.count() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::decode_quantized_mesh;

    #[test]
    fn test_generate_small_tileset() {
        let dir = tempfile::tempdir().unwrap();
        let rect = GeoRect::new(116.0, 39.0, 117.0, 40.0).unwrap();
        let options = TilesetOptions {
            min_zoom: 0,
            max_zoom: 1,
            grid_size: 5,
            gzip: false,
        };
        let stats = generate_tileset(&ConstantHeight(100.0), &rect, dir.path(), &options).unwrap();
        assert_eq!(stats.tiles_written, 2);
        assert!(stats.bytes_written > 0);

        let tile_path = dir.path().join("0/1/0.terrain");
        let payload = std::fs::read(tile_path).unwrap();
        let mesh = decode_quantized_mesh(&payload).unwrap();
        assert_eq!(mesh.vertex_count, 25);
    }

    #[test]
    fn test_sampler_sees_tile_coordinates() {
        let rect = GeoRect::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let grid = sample_tile_grid(&|lon: f64, lat: f64| (lon + lat) as f32, &rect, 3).unwrap();
        // Row 0 is the north edge.
        assert_eq!(grid.values()[0], 1.0);
        assert_eq!(grid.values()[8], 1.0);
        assert_eq!(grid.values()[2], 2.0);
        assert_eq!(grid.values()[6], 0.0);
    }

    #[test]
    fn test_planned_tile_count() {
        let rect = GeoRect::new(0.0, 0.0, 90.0, 90.0).unwrap();
        assert_eq!(planned_tile_count(&rect, 0, 1).unwrap(), 2);
    }

    #[test]
    fn test_rejects_tiny_grid() {
        let rect = GeoRect::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(sample_tile_grid(&ConstantHeight(0.0), &rect, 1).is_err());
    }
}
