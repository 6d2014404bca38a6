//! Legend-driven value → RGBA mapping and legend side-cars

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use stratus_config::legend::{LegendConfig, LegendKind, LegendStop};

use crate::error::{Error, Result};

/// Parse a `#RGB`, `#RRGGBB` or `#RRGGBBAA` hex color.
pub fn parse_hex_color(color: &str) -> Result<[u8; 4]> {
    let hex = color.trim().strip_prefix('#').ok_or_else(|| {
        Error::invalid_argument(format!("color must start with '#': {color:?}"))
    })?;
    let parse_pair = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| Error::invalid_argument(format!("invalid hex color: {color:?}")))
    };
    match hex.len() {
        3 => {
            let mut out = [0u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = parse_pair(&c.to_string())?;
                out[i] = v * 17;
            }
            out[3] = 255;
            Ok(out)
        }
        6 => Ok([
            parse_pair(&hex[0..2])?,
            parse_pair(&hex[2..4])?,
            parse_pair(&hex[4..6])?,
            255,
        ]),
        8 => Ok([
            parse_pair(&hex[0..2])?,
            parse_pair(&hex[2..4])?,
            parse_pair(&hex[4..6])?,
            parse_pair(&hex[6..8])?,
        ]),
        _ => Err(Error::invalid_argument(format!(
            "invalid hex color: {color:?}"
        ))),
    }
}

/// A compiled legend ready to color pixels.
///
/// Values outside the legend domain (and NaN) map to fully transparent.
#[derive(Debug)]
pub struct Colormap {
    kind: LegendKind,
    stops: Vec<(f64, [u8; 4])>,
    opacity: f64,
}

impl Colormap {
    /// Compile a legend with a global opacity in [0, 1].
    pub fn new(legend: &LegendConfig, opacity: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) || !opacity.is_finite() {
            return Err(Error::invalid_argument(
                "opacity must be between 0 and 1",
            ));
        }
        let stops = legend
            .stops
            .iter()
            .map(|stop| Ok((stop.value, parse_hex_color(&stop.color)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind: legend.kind,
            stops,
            opacity,
        })
    }

    /// RGBA for a physical value.
    pub fn color_for(&self, value: f32) -> [u8; 4] {
        if !value.is_finite() {
            return [0, 0, 0, 0];
        }
        let v = value as f64;
        let first = self.stops.first().expect("validated non-empty");
        let last = self.stops.last().expect("validated non-empty");
        if v < first.0 || v > last.0 {
            return [0, 0, 0, 0];
        }

        let rgba = match self.kind {
            LegendKind::Categorical => {
                let mut color = first.1;
                for &(stop_value, stop_color) in &self.stops {
                    if v >= stop_value {
                        color = stop_color;
                    }
                }
                color
            }
            LegendKind::Gradient => {
                let mut color = last.1;
                for window in self.stops.windows(2) {
                    let (v0, c0) = window[0];
                    let (v1, c1) = window[1];
                    if v >= v0 && v <= v1 {
                        let frac = if v1 > v0 { (v - v0) / (v1 - v0) } else { 0.0 };
                        color = [
                            lerp(c0[0], c1[0], frac),
                            lerp(c0[1], c1[1], frac),
                            lerp(c0[2], c1[2], frac),
                            lerp(c0[3], c1[3], frac),
                        ];
                        break;
                    }
                }
                color
            }
        };

        let alpha = (rgba[3] as f64 * self.opacity).round().clamp(0.0, 255.0) as u8;
        [rgba[0], rgba[1], rgba[2], alpha]
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }
}

fn lerp(a: u8, b: u8, frac: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * frac).round().clamp(0.0, 255.0) as u8
}

/// Stable digest of the legend stops; both side-cars carry the same value.
pub fn legend_version(stops: &[LegendStop]) -> String {
    let mut hasher = Sha256::new();
    for stop in stops {
        hasher.update(format!(
            "{}|{}|{}\n",
            stop.value,
            stop.color,
            stop.label.as_deref().unwrap_or("")
        ));
    }
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// The `legend.json` side-car written next to the tiles.
#[derive(Debug, Clone, Serialize)]
pub struct LegendSidecar<'a> {
    pub title: &'a str,
    pub unit: &'a str,
    pub stops: &'a [LegendStop],
    pub min: f64,
    pub max: f64,
    pub version: String,
}

impl<'a> LegendSidecar<'a> {
    pub fn from_legend(legend: &'a LegendConfig) -> Self {
        Self {
            title: &legend.title,
            unit: &legend.unit,
            stops: &legend.stops,
            min: legend.min_value(),
            max: legend.max_value(),
            version: legend_version(&legend.stops),
        }
    }
}

/// Write the two legend side-cars: `{layer}/legend.json` and
/// `{layer}/{level}/legend.json`.
pub fn write_legend_sidecars(
    out_root: &Path,
    layer: &str,
    level: &str,
    legend: &LegendConfig,
) -> Result<()> {
    let sidecar = LegendSidecar::from_legend(legend);
    let body = serde_json::to_vec_pretty(&sidecar)?;

    let layer_dir = out_root.join(layer);
    std::fs::create_dir_all(&layer_dir)?;
    std::fs::write(layer_dir.join("legend.json"), &body)?;

    let level_dir = layer_dir.join(level);
    std::fs::create_dir_all(&level_dir)?;
    std::fs::write(level_dir.join("legend.json"), &body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_legend() -> LegendConfig {
        serde_json::from_str(
            r##"{
  "title": "Wind speed",
  "unit": "m/s",
  "type": "gradient",
  "stops": [
    { "value": 0, "color": "#000000" },
    { "value": 10, "color": "#FFFFFF" }
  ]
}"##,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#000000").unwrap(), [0, 0, 0, 255]);
        assert_eq!(parse_hex_color("#ff0080").unwrap(), [255, 0, 128, 255]);
        assert_eq!(parse_hex_color("#ff008040").unwrap(), [255, 0, 128, 64]);
        assert_eq!(parse_hex_color("#fff").unwrap(), [255, 255, 255, 255]);
        assert!(parse_hex_color("red").is_err());
        assert!(parse_hex_color("#12345").is_err());
    }

    #[test]
    fn test_gradient_interpolates() {
        let colormap = Colormap::new(&gradient_legend(), 1.0).unwrap();
        assert_eq!(colormap.color_for(0.0), [0, 0, 0, 255]);
        assert_eq!(colormap.color_for(10.0), [255, 255, 255, 255]);
        assert_eq!(colormap.color_for(5.0), [128, 128, 128, 255]);
    }

    #[test]
    fn test_out_of_domain_is_transparent() {
        let colormap = Colormap::new(&gradient_legend(), 1.0).unwrap();
        assert_eq!(colormap.color_for(-0.1), [0, 0, 0, 0]);
        assert_eq!(colormap.color_for(10.1), [0, 0, 0, 0]);
        assert_eq!(colormap.color_for(f32::NAN), [0, 0, 0, 0]);
    }

    #[test]
    fn test_opacity_scales_alpha() {
        let colormap = Colormap::new(&gradient_legend(), 0.5).unwrap();
        assert_eq!(colormap.color_for(10.0)[3], 128);
    }

    #[test]
    fn test_opacity_validated() {
        let err = Colormap::new(&gradient_legend(), 1.5).unwrap_err();
        assert!(err.to_string().contains("opacity must be between 0 and 1"));
        assert!(Colormap::new(&gradient_legend(), -0.1).is_err());
    }

    #[test]
    fn test_categorical_buckets() {
        let legend: LegendConfig = serde_json::from_str(
            r##"{
  "title": "Risk",
  "unit": "",
  "type": "categorical",
  "stops": [
    { "value": 0, "color": "#00ff00" },
    { "value": 5, "color": "#ffff00" },
    { "value": 10, "color": "#ff0000" }
  ]
}"##,
        )
        .unwrap();
        let colormap = Colormap::new(&legend, 1.0).unwrap();
        assert_eq!(colormap.color_for(0.0), [0, 255, 0, 255]);
        assert_eq!(colormap.color_for(4.9), [0, 255, 0, 255]);
        assert_eq!(colormap.color_for(5.0), [255, 255, 0, 255]);
        assert_eq!(colormap.color_for(10.0), [255, 0, 0, 255]);
        assert_eq!(colormap.color_for(11.0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_legend_version_stable() {
        let legend = gradient_legend();
        let v1 = legend_version(&legend.stops);
        let v2 = legend_version(&legend.stops);
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 16);

        let mut other = legend.clone();
        other.stops[0].value = 1.0;
        assert_ne!(legend_version(&other.stops), v1);
    }

    #[test]
    fn test_sidecars_share_version() {
        let dir = tempfile::tempdir().unwrap();
        let legend = gradient_legend();
        write_legend_sidecars(dir.path(), "ecmwf/wind_speed", "sfc", &legend).unwrap();

        let layer: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("ecmwf/wind_speed/legend.json")).unwrap(),
        )
        .unwrap();
        let level: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("ecmwf/wind_speed/sfc/legend.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(layer["version"], level["version"]);
        assert_eq!(layer["unit"], "m/s");
        assert_eq!(layer["min"], 0.0);
        assert_eq!(layer["max"], 10.0);
    }
}
