//! `layer.json` descriptor for terrain tilesets

use std::path::Path;

use serde::{Deserialize, Serialize};

use stratus_core::pyramid::{available_ranges, TileRange};
use stratus_core::GeoRect;

use crate::error::Result;

/// Terrain layer descriptor served next to the tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerJson {
    pub tilejson: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub format: String,
    pub attribution: String,
    pub scheme: String,
    pub tiles: Vec<String>,
    pub projection: String,
    /// `[west, south, east, north]`
    pub bounds: [f64; 4],
    pub minzoom: u32,
    pub maxzoom: u32,
    /// Per-zoom tile ranges from zoom 0 through `maxzoom`.
    pub available: Vec<Vec<TileRange>>,
    /// Only present when the tiles carry extensions (e.g. vertex normals).
    #[serde(
        rename = "extensionList",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extension_list: Vec<String>,
}

/// Assemble the `layer.json` for a tileset covering `rect`.
pub fn build_layer_json(
    rect: &GeoRect,
    min_zoom: u32,
    max_zoom: u32,
    name: &str,
    attribution: &str,
) -> Result<LayerJson> {
    let available = available_ranges(rect, min_zoom, max_zoom)?;
    Ok(LayerJson {
        tilejson: "2.1.0".to_string(),
        name: name.to_string(),
        description: format!("Quantized-mesh terrain for {name}"),
        version: "1.0.0".to_string(),
        format: "quantized-mesh-1.0".to_string(),
        attribution: attribution.to_string(),
        scheme: "tms".to_string(),
        tiles: vec!["{z}/{x}/{y}.terrain?v={version}".to_string()],
        projection: "EPSG:4326".to_string(),
        bounds: rect.to_array(),
        minzoom: min_zoom,
        maxzoom: max_zoom,
        available,
        extension_list: Vec::new(),
    })
}

/// Write a `layer.json` file, creating parent directories.
pub fn write_layer_json(path: &Path, layer: &LayerJson) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(layer)?;
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_layer_json() {
        let rect = GeoRect::new(0.0, 0.0, 90.0, 90.0).unwrap();
        let layer = build_layer_json(&rect, 0, 1, "glo30", "Copernicus DEM").unwrap();
        assert_eq!(layer.scheme, "tms");
        assert_eq!(layer.projection, "EPSG:4326");
        assert_eq!(layer.format, "quantized-mesh-1.0");
        assert_eq!(layer.bounds, [0.0, 0.0, 90.0, 90.0]);
        assert_eq!(layer.available.len(), 2);
        assert_eq!(layer.minzoom, 0);
        assert_eq!(layer.maxzoom, 1);
    }

    #[test]
    fn test_extension_list_omitted_when_empty() {
        let rect = GeoRect::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let layer = build_layer_json(&rect, 0, 0, "test", "").unwrap();
        let json = serde_json::to_value(&layer).unwrap();
        assert!(json.get("extensionList").is_none());
        assert_eq!(json["tilejson"], "2.1.0");
    }

    #[test]
    fn test_layer_json_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/layer.json");
        let rect = GeoRect::new(116.0, 39.0, 117.0, 40.0).unwrap();
        let layer = build_layer_json(&rect, 0, 2, "beijing", "test").unwrap();
        write_layer_json(&path, &layer).unwrap();

        let body = std::fs::read(&path).unwrap();
        let loaded: LayerJson = serde_json::from_slice(&body).unwrap();
        assert_eq!(loaded, layer);
    }
}
