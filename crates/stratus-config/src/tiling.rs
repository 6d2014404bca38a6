//! Tiling config (`tiling.yaml`)

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;

pub const DEFAULT_TILING_CONFIG_NAME: &str = "tiling.yaml";
pub const TILING_CONFIG_ENV: &str = "DIGITAL_EARTH_TILING_CONFIG";

/// CRS values the tile pipeline can render.
pub const SUPPORTED_TILING_CRS: [&str; 1] = ["EPSG:4326"];

/// An inclusive zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoomRange {
    pub min_zoom: u32,
    pub max_zoom: u32,
}

/// Tiling configuration: CRS, the disjoint global/event zoom ranges and the
/// tile edge size in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TilingConfig {
    pub crs: String,
    #[serde(rename = "global")]
    pub global_range: ZoomRange,
    pub event: ZoomRange,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

fn default_tile_size() -> u32 {
    256
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TilingConfigFile {
    tiling: TilingConfig,
}

impl TilingConfig {
    fn validate(mut self) -> Result<Self> {
        let normalized = self.crs.trim().to_ascii_uppercase();
        if !SUPPORTED_TILING_CRS.contains(&normalized.as_str()) {
            return Err(Error::config(format!(
                "unsupported tiling CRS {:?}; supported: {SUPPORTED_TILING_CRS:?}",
                self.crs
            )));
        }
        self.crs = normalized;

        for (name, range) in [("global", &self.global_range), ("event", &self.event)] {
            if range.max_zoom < range.min_zoom {
                return Err(Error::config(format!(
                    "{name} zoom range must have min_zoom <= max_zoom"
                )));
            }
        }
        if self.global_range.max_zoom >= self.event.min_zoom {
            return Err(Error::config(
                "global zoom range must end before event zoom range starts",
            ));
        }
        if self.tile_size == 0 {
            return Err(Error::config("tile_size must be > 0"));
        }
        Ok(self)
    }
}

/// Parse and validate tiling YAML.
pub fn parse_tiling_config(raw: &[u8]) -> Result<TilingConfig> {
    let file: TilingConfigFile = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid tiling config: {e}")))?;
    file.tiling.validate()
}

fn cache() -> &'static PayloadCache<TilingConfig> {
    static CACHE: OnceLock<PayloadCache<TilingConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(8))
}

/// Load the tiling config (explicit path → `DIGITAL_EARTH_TILING_CONFIG` →
/// `{config_dir}/tiling.yaml`), cached by file identity.
pub fn get_tiling_config(path: Option<&Path>) -> Result<Payload<TilingConfig>> {
    let resolved = resolve_config_path(path, TILING_CONFIG_ENV, DEFAULT_TILING_CONFIG_NAME);
    cache().get_or_load(&resolved, parse_tiling_config)
}

/// Drop cached tiling payloads.
pub fn clear_tiling_config_cache() {
    cache().clear()
}
