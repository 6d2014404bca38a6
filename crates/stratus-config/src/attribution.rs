//! Attribution config (`attribution.yaml`)
//!
//! Renders the configured sources and disclaimer into the plain-text
//! attribution payload served to clients, with the ETag computed over the
//! raw YAML bytes.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::check_schema_version;
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;

pub const DEFAULT_ATTRIBUTION_CONFIG_NAME: &str = "attribution.yaml";
pub const ATTRIBUTION_CONFIG_ENV: &str = "DIGITAL_EARTH_ATTRIBUTION_CONFIG";

/// One attributed data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub attribution: Option<String>,
}

/// Parsed attribution config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionConfig {
    pub schema_version: u32,
    pub version: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub sources: Vec<AttributionSource>,
    pub disclaimer: Vec<String>,
}

impl AttributionConfig {
    fn validate(self) -> Result<Self> {
        check_schema_version("attribution", self.schema_version)?;
        Ok(self)
    }

    /// Render the attribution as the plain text served to clients.
    pub fn render_text(&self) -> String {
        let mut lines = vec![format!("Attribution (v{})", self.version)];
        if let Some(updated_at) = &self.updated_at {
            lines.push(format!("Updated: {updated_at}"));
        }

        lines.push(String::new());
        lines.push("Sources:".to_string());
        for source in &self.sources {
            lines.push(format_source_line(source));
        }

        lines.push(String::new());
        lines.push("Disclaimer:".to_string());
        for item in &self.disclaimer {
            let item = item.trim();
            if !item.is_empty() {
                lines.push(format!("- {item}"));
            }
        }
        let mut text = lines.join("\n").trim().to_string();
        text.push('\n');
        text
    }
}

fn format_source_line(source: &AttributionSource) -> String {
    let name = source.name.trim();
    let left = match &source.attribution {
        Some(attribution) if attribution.trim() != name => {
            format!("{} — {name}", attribution.trim())
        }
        _ => name.to_string(),
    };

    let suffixes: Vec<&str> = [&source.provider, &source.url, &source.license]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if suffixes.is_empty() {
        format!("- {left}")
    } else {
        format!("- {left} ({})", suffixes.join(" · "))
    }
}

/// Parse and validate attribution YAML.
pub fn parse_attribution_config(raw: &[u8]) -> Result<AttributionConfig> {
    let config: AttributionConfig = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid attribution config: {e}")))?;
    config.validate()
}

fn cache() -> &'static PayloadCache<AttributionConfig> {
    static CACHE: OnceLock<PayloadCache<AttributionConfig>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(4))
}

/// Load the attribution config, cached by file identity.
pub fn get_attribution_config(path: Option<&Path>) -> Result<Payload<AttributionConfig>> {
    let resolved = resolve_config_path(
        path,
        ATTRIBUTION_CONFIG_ENV,
        DEFAULT_ATTRIBUTION_CONFIG_NAME,
    );
    cache().get_or_load(&resolved, parse_attribution_config)
}

/// Drop cached attribution payloads.
pub fn clear_attribution_config_cache() {
    cache().clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "\
schema_version: 1
version: \"3\"
updated_at: 2026-06-01
sources:
  - id: ecmwf
    name: ECMWF Open Data
    provider: ECMWF
    url: https://www.ecmwf.int
    license: CC-BY-4.0
  - id: dem
    name: Copernicus DEM
    attribution: \"© DLR 2010-2014\"
disclaimer:
  - Forecasts are provided as-is.
  - \"  \"
";

    #[test]
    fn test_render_text() {
        let config = parse_attribution_config(YAML.as_bytes()).unwrap();
        let text = config.render_text();
        assert!(text.starts_with("Attribution (v3)"));
        assert!(text.contains("Updated: 2026-06-01"));
        assert!(text.contains("- ECMWF Open Data (ECMWF · https://www.ecmwf.int · CC-BY-4.0)"));
        assert!(text.contains("- © DLR 2010-2014 — Copernicus DEM"));
        assert!(text.contains("- Forecasts are provided as-is."));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_rejects_schema_version() {
        let yaml = YAML.replace("schema_version: 1", "schema_version: 7");
        assert!(parse_attribution_config(yaml.as_bytes()).is_err());
    }
}
