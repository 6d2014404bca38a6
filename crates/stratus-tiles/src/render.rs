//! Rendering one (variable, level, time) unit into a tile tree
//!
//! Tiles land at `{root}/{layer}/{time_key}/{level}/{z}/{x}/{y}.{ext}` with
//! the legend side-cars at `{root}/{layer}/legend.json` and
//! `{root}/{layer}/{level}/legend.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stratus_config::legend::LegendConfig;
use stratus_core::proj::TileCrs;
use stratus_cube::DataCube;

use crate::error::{Error, Result};
use crate::legend::{write_legend_sidecars, Colormap};

/// Tile output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Png,
    Webp,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Webp => "webp",
        }
    }
}

impl std::str::FromStr for TileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "webp" => Ok(TileFormat::Webp),
            other => Err(Error::invalid_argument(format!(
                "unsupported tile format: {other:?}"
            ))),
        }
    }
}

/// The time key used in tile paths: `YYYYMMDDTHHMMSSZ`.
pub fn time_key(t: DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Render settings for one tile set.
#[derive(Debug, Clone)]
pub struct TileRenderConfig {
    pub crs: TileCrs,
    pub tile_size: u32,
    pub min_zoom: u32,
    pub max_zoom: u32,
    pub formats: Vec<TileFormat>,
    pub opacity: f64,
}

impl Default for TileRenderConfig {
    fn default() -> Self {
        Self {
            crs: TileCrs::Epsg4326,
            tile_size: 256,
            min_zoom: 0,
            max_zoom: 2,
            formats: vec![TileFormat::Png],
            opacity: 1.0,
        }
    }
}

/// Outcome of rendering one (variable, level, time) unit.
#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub layer: String,
    pub variable: String,
    pub level: String,
    /// Time key as it appears in tile paths.
    pub time: String,
    pub opacity: f64,
    pub tiles_written: u64,
}

/// Renders cube slices into tile trees through a legend.
pub struct TileRenderer {
    legend: LegendConfig,
    colormap: Colormap,
    config: TileRenderConfig,
}

impl TileRenderer {
    pub fn new(legend: LegendConfig, config: TileRenderConfig) -> Result<Self> {
        if config.tile_size == 0 {
            return Err(Error::invalid_argument("tile_size must be > 0"));
        }
        if config.min_zoom > config.max_zoom {
            return Err(Error::invalid_argument(format!(
                "expected min_zoom <= max_zoom, got {} > {}",
                config.min_zoom, config.max_zoom
            )));
        }
        if config.formats.is_empty() {
            return Err(Error::invalid_argument("at least one tile format required"));
        }
        let colormap = Colormap::new(&legend, config.opacity)?;
        Ok(Self {
            legend,
            colormap,
            config,
        })
    }

    /// Render every tile of the configured zoom range for one
    /// (variable, level, time) unit and write the legend side-cars.
    pub fn render_unit(
        &self,
        cube: &DataCube,
        variable: &str,
        level_key: &str,
        time: DateTime<Utc>,
        out_root: &Path,
        layer: &str,
    ) -> Result<RenderResult> {
        let time_idx = cube
            .time()
            .iter()
            .position(|&t| t == time)
            .ok_or_else(|| {
                Error::invalid_argument(format!("time {time} not present in cube"))
            })?;
        let level_idx = resolve_level_index(cube, level_key)?;
        let grid = cube.slice(variable, time_idx, level_idx)?;

        let tkey = time_key(time);
        let unit_root = out_root.join(layer).join(&tkey).join(level_key);

        let mut tiles_written = 0u64;
        for z in self.config.min_zoom..=self.config.max_zoom {
            let n = 1u32 << z;
            for x in 0..n {
                for y in 0..n {
                    let image = self.render_tile(&grid, cube.lat(), cube.lon(), z, x, y);
                    for format in &self.config.formats {
                        let dir = unit_root.join(z.to_string()).join(x.to_string());
                        std::fs::create_dir_all(&dir)?;
                        let path = dir.join(format!("{y}.{}", format.extension()));
                        write_image(&image, &path, *format)?;
                        tiles_written += 1;
                    }
                }
            }
        }

        write_legend_sidecars(out_root, layer, level_key, &self.legend)?;
        debug!(layer, variable, level = level_key, time = %tkey, tiles_written, "rendered unit");

        Ok(RenderResult {
            layer: layer.to_string(),
            variable: variable.to_string(),
            level: level_key.to_string(),
            time: tkey,
            opacity: self.colormap.opacity(),
            tiles_written,
        })
    }

    /// Rasterize one tile by nearest-neighbor sampling at pixel centers.
    fn render_tile(
        &self,
        grid: &Array2<f32>,
        lat: &[f64],
        lon: &[f64],
        z: u32,
        x: u32,
        y: u32,
    ) -> RgbaImage {
        let size = self.config.tile_size;
        let bounds = self.config.crs.tile_bounds(z, x, y);
        let mut image = RgbaImage::new(size, size);
        for py in 0..size {
            let frac_y = (py as f64 + 0.5) / size as f64;
            let pixel_lat = bounds.north - bounds.height() * frac_y;
            let row = nearest_index(lat, pixel_lat);
            for px in 0..size {
                let frac_x = (px as f64 + 0.5) / size as f64;
                let pixel_lon = bounds.west + bounds.width() * frac_x;
                let col = nearest_index(lon, pixel_lon);
                let value = grid[[row, col]];
                image.put_pixel(px, py, image::Rgba(self.colormap.color_for(value)));
            }
        }
        image
    }
}

/// Map a level key (`sfc` or a numeric level) to a cube level index.
fn resolve_level_index(cube: &DataCube, level_key: &str) -> Result<usize> {
    if level_key.eq_ignore_ascii_case("sfc") {
        return Ok(0);
    }
    let target: f64 = level_key.parse().map_err(|_| {
        Error::invalid_argument(format!("unknown level key: {level_key:?}"))
    })?;
    cube.level()
        .iter()
        .position(|&l| (l - target).abs() < 1e-9)
        .ok_or_else(|| {
            Error::invalid_argument(format!("level {level_key:?} not present in cube"))
        })
}

/// Index of the value in sorted `coords` nearest to `target`.
fn nearest_index(coords: &[f64], target: f64) -> usize {
    match coords.binary_search_by(|probe| probe.partial_cmp(&target).expect("finite coords")) {
        Ok(idx) => idx,
        Err(idx) => {
            if idx == 0 {
                0
            } else if idx >= coords.len() {
                coords.len() - 1
            } else if (coords[idx] - target).abs() < (target - coords[idx - 1]).abs() {
                idx
            } else {
                idx - 1
            }
        }
    }
}

fn write_image(image: &RgbaImage, path: &PathBuf, format: TileFormat) -> Result<()> {
    match format {
        TileFormat::Png => image.save_with_format(path, image::ImageFormat::Png)?,
        TileFormat::Webp => image.save_with_format(path, image::ImageFormat::WebP)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::Array4;
    use stratus_cube::Variable;

    fn legend() -> LegendConfig {
        serde_json::from_str(
            r##"{
  "title": "Wind speed",
  "unit": "m/s",
  "type": "gradient",
  "stops": [
    { "value": 0, "color": "#ECFEFF" },
    { "value": 50, "color": "#4C1D95" }
  ]
}"##,
        )
        .unwrap()
    }

    fn surface_cube(value: f32) -> DataCube {
        let mut cube = DataCube::new(
            vec![Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()],
            vec![0.0],
            vec![-90.0, 0.0, 90.0],
            vec![-180.0, 0.0, 180.0],
        )
        .unwrap();
        cube.add_variable(
            "wind_speed",
            Variable::new(Array4::from_elem((1, 1, 3, 3), value)).with_units("m/s"),
        )
        .unwrap();
        cube
    }

    #[test]
    fn test_time_key_format() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(time_key(t), "20260101T000000Z");
    }

    #[test]
    fn test_render_unit_applies_opacity_and_writes_legend() {
        let dir = tempfile::tempdir().unwrap();
        let cube = surface_cube(10.0);
        let renderer = TileRenderer::new(
            legend(),
            TileRenderConfig {
                tile_size: 8,
                min_zoom: 0,
                max_zoom: 0,
                opacity: 0.5,
                ..TileRenderConfig::default()
            },
        )
        .unwrap();

        let result = renderer
            .render_unit(
                &cube,
                "wind_speed",
                "sfc",
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                dir.path(),
                "ecmwf/wind_speed",
            )
            .unwrap();
        assert_eq!(result.layer, "ecmwf/wind_speed");
        assert_eq!(result.time, "20260101T000000Z");
        assert_eq!(result.tiles_written, 1);

        let tile_path = dir
            .path()
            .join("ecmwf/wind_speed/20260101T000000Z/sfc/0/0/0.png");
        let image = image::open(&tile_path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (8, 8));
        for pixel in image.pixels() {
            assert_eq!(pixel.0[3], 128);
            assert!(pixel.0[0] > 0 || pixel.0[1] > 0 || pixel.0[2] > 0);
        }

        let legend_path = dir.path().join("ecmwf/wind_speed/legend.json");
        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(legend_path).unwrap()).unwrap();
        assert_eq!(sidecar["unit"], "m/s");
        assert_eq!(sidecar["min"], 0.0);
        assert_eq!(sidecar["max"], 50.0);

        let level_path = dir.path().join("ecmwf/wind_speed/sfc/legend.json");
        let level_sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(level_path).unwrap()).unwrap();
        assert_eq!(level_sidecar["version"], sidecar["version"]);
    }

    #[test]
    fn test_nan_cells_render_transparent() {
        let dir = tempfile::tempdir().unwrap();
        let cube = surface_cube(f32::NAN);
        let renderer = TileRenderer::new(
            legend(),
            TileRenderConfig {
                tile_size: 4,
                min_zoom: 0,
                max_zoom: 0,
                ..TileRenderConfig::default()
            },
        )
        .unwrap();
        renderer
            .render_unit(
                &cube,
                "wind_speed",
                "sfc",
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                dir.path(),
                "wind",
            )
            .unwrap();
        let image = image::open(dir.path().join("wind/20260101T000000Z/sfc/0/0/0.png"))
            .unwrap()
            .to_rgba8();
        for pixel in image.pixels() {
            assert_eq!(pixel.0[3], 0);
        }
    }

    #[test]
    fn test_unknown_time_or_level_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cube = surface_cube(1.0);
        let renderer = TileRenderer::new(legend(), TileRenderConfig::default()).unwrap();
        let wrong_time = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert!(renderer
            .render_unit(&cube, "wind_speed", "sfc", wrong_time, dir.path(), "w")
            .is_err());

        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(renderer
            .render_unit(&cube, "wind_speed", "850", t, dir.path(), "w")
            .is_err());
    }

    #[test]
    fn test_renderer_validation() {
        assert!(TileRenderer::new(
            legend(),
            TileRenderConfig {
                opacity: 1.5,
                ..TileRenderConfig::default()
            }
        )
        .is_err());
        assert!(TileRenderer::new(
            legend(),
            TileRenderConfig {
                min_zoom: 3,
                max_zoom: 1,
                ..TileRenderConfig::default()
            }
        )
        .is_err());
    }
}
