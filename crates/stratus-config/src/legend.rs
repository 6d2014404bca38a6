//! Legend configs (`{legends_dir}/{layer}.json`)
//!
//! A legend maps physical values to colors, either as a continuous
//! gradient or as categorical buckets. The tile worker renders through the
//! parsed record; the raw payload + ETag serve HTTP consumers.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::error::{Error, Result};

pub const LEGENDS_DIR_ENV: &str = "DIGITAL_EARTH_LEGENDS_DIR";
const DEFAULT_LEGENDS_DIR: &str = "config/legends";

/// Legend rendering kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendKind {
    /// Colors interpolate between stops.
    Gradient,
    /// Each stop colors the bucket up to the next stop.
    Categorical,
}

/// One legend stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegendStop {
    pub value: f64,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A parsed legend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegendConfig {
    pub title: String,
    pub unit: String,
    #[serde(rename = "type")]
    pub kind: LegendKind,
    pub stops: Vec<LegendStop>,
}

impl LegendConfig {
    fn validate(self) -> Result<Self> {
        if self.stops.is_empty() {
            return Err(Error::config("legend stops must not be empty"));
        }
        for stop in &self.stops {
            if !stop.value.is_finite() {
                return Err(Error::config("legend stop values must be finite"));
            }
            if stop.color.trim().is_empty() {
                return Err(Error::config("legend stop colors must not be empty"));
            }
        }
        let increasing = self.stops.windows(2).all(|w| w[0].value < w[1].value);
        if !increasing {
            return Err(Error::config(
                "legend stop values must be strictly increasing",
            ));
        }
        Ok(self)
    }

    /// Smallest stop value.
    pub fn min_value(&self) -> f64 {
        self.stops.first().map(|s| s.value).unwrap_or(f64::NAN)
    }

    /// Largest stop value.
    pub fn max_value(&self) -> f64 {
        self.stops.last().map(|s| s.value).unwrap_or(f64::NAN)
    }
}

/// Parse and validate legend JSON.
pub fn parse_legend_config(raw: &[u8]) -> Result<LegendConfig> {
    let config: LegendConfig = serde_json::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid legend config: {e}")))?;
    config.validate()
}

/// Resolve the legends directory (explicit arg → env → repo default).
pub fn resolve_legends_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(LEGENDS_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from(DEFAULT_LEGENDS_DIR)
}

fn cache() -> &'static PayloadCache<LegendConfig> {
    static CACHE: OnceLock<PayloadCache<LegendConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(32))
}

/// Load `{legends_dir}/{layer_type}.json`, cached by file identity.
pub fn get_legend_config(
    layer_type: &str,
    legends_dir: Option<&Path>,
) -> Result<Payload<LegendConfig>> {
    let name = layer_type.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(Error::config(format!(
            "legend layer type must be a plain name: {layer_type:?}"
        )));
    }
    let path = resolve_legends_dir(legends_dir).join(format!("{name}.json"));
    cache().get_or_load(&path, parse_legend_config)
}

/// Drop cached legend payloads.
pub fn clear_legend_config_cache() {
    cache().clear()
}
