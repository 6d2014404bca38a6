//! Source decoders: NetCDF and GRIB into [`RawDataset`]
//!
//! Decoders produce the raw intermediate; normalization into a canonical
//! cube happens in [`crate::raw`]. Each format sits behind its cargo
//! feature; requesting a format that was not compiled in yields a decode
//! error naming the feature, so callers can surface an actionable message.

use std::path::Path;

use crate::cube::DataCube;
use crate::error::{Error, Result};

/// Source file formats the pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Netcdf,
    Grib,
}

/// Infer the source format from a file extension.
pub fn infer_source_format(path: &Path) -> Result<SourceFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "nc" | "netcdf" => Ok(SourceFormat::Netcdf),
        "grib" | "grb" | "grib2" | "grb2" => Ok(SourceFormat::Grib),
        _ => Err(Error::decode(format!(
            "unsupported source file type: {}",
            path.display()
        ))),
    }
}

/// Decode a source file into a canonical cube, inferring the format from
/// the extension when not given.
pub fn decode_source(path: &Path, format: Option<SourceFormat>) -> Result<DataCube> {
    let format = match format {
        Some(format) => format,
        None => infer_source_format(path)?,
    };
    match format {
        SourceFormat::Netcdf => decode_netcdf(path),
        SourceFormat::Grib => decode_grib(path),
    }
}

/// Decode a NetCDF source into a canonical cube.
#[cfg(feature = "netcdf")]
pub fn decode_netcdf(path: &Path) -> Result<DataCube> {
    use chrono::TimeZone;

    use crate::raw::{canonical_dim, RawDataset, RawVariable};

    if !path.is_file() {
        return Err(Error::decode(format!(
            "NetCDF file not found: {}",
            path.display()
        )));
    }
    let file = netcdf::open(path).map_err(|e| {
        Error::decode(format!("failed to open NetCDF {}: {e}", path.display()))
    })?;

    let mut raw = RawDataset::default();
    let mut coord_names: Vec<String> = Vec::new();

    for var in file.variables() {
        let name = var.name();
        let Some(canonical) = canonical_dim(&name) else {
            continue;
        };
        coord_names.push(name.clone());
        match canonical {
            "lat" => raw.lat = var.get_values::<f64, _>(..).map_err(decode_err)?,
            "lon" => raw.lon = var.get_values::<f64, _>(..).map_err(decode_err)?,
            "level" => raw.level = Some(var.get_values::<f64, _>(..).map_err(decode_err)?),
            "time" => {
                let secs = var.get_values::<i64, _>(..).map_err(decode_err)?;
                let times = secs
                    .into_iter()
                    .map(|s| {
                        chrono::Utc.timestamp_opt(s, 0).single().ok_or_else(|| {
                            Error::decode(format!("invalid time value: {s}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                raw.time = Some(times);
            }
            _ => {}
        }
    }
    if raw.lat.is_empty() || raw.lon.is_empty() {
        return Err(Error::decode(format!(
            "NetCDF source has no lat/lon coordinates: {}",
            path.display()
        )));
    }

    for var in file.variables() {
        let name = var.name();
        if coord_names.contains(&name) {
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if !dims.iter().all(|d| canonical_dim(d).is_some()) {
            continue;
        }
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let values = var.get_values::<f64, _>(..).map_err(decode_err)?;
        let data = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), values)
            .map_err(|e| Error::decode(format!("variable {name:?} shape error: {e}")))?;

        let mut fill_values = Vec::new();
        for attr_name in ["_FillValue", "missing_value"] {
            if let Some(attr) = var.attribute(attr_name) {
                if let Ok(value) = attr.value() {
                    if let Some(v) = numeric_attr(&value) {
                        fill_values.push(v);
                    }
                }
            }
        }

        raw.variables.insert(
            name,
            RawVariable {
                dims,
                data,
                units: string_attr(&var, "units"),
                long_name: string_attr(&var, "long_name"),
                fill_values,
            },
        );
    }

    DataCube::from_raw(raw)
}

#[cfg(feature = "netcdf")]
fn decode_err<E: std::fmt::Display>(err: E) -> Error {
    Error::decode(err.to_string())
}

#[cfg(feature = "netcdf")]
fn string_attr(var: &netcdf::Variable<'_>, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

#[cfg(feature = "netcdf")]
fn numeric_attr(value: &netcdf::AttributeValue) -> Option<f64> {
    use netcdf::AttributeValue as A;
    match value {
        A::Uchar(v) => Some(*v as f64),
        A::Schar(v) => Some(*v as f64),
        A::Ushort(v) => Some(*v as f64),
        A::Short(v) => Some(*v as f64),
        A::Uint(v) => Some(*v as f64),
        A::Int(v) => Some(*v as f64),
        A::Ulonglong(v) => Some(*v as f64),
        A::Longlong(v) => Some(*v as f64),
        A::Float(v) => Some(*v as f64),
        A::Double(v) => Some(*v),
        _ => None,
    }
}

/// NetCDF decoding requires the `netcdf` cargo feature.
#[cfg(not(feature = "netcdf"))]
pub fn decode_netcdf(_path: &Path) -> Result<DataCube> {
    Err(Error::decode(
        "NetCDF decoding requires the `netcdf` cargo feature",
    ))
}

/// Decode the first submessage of a GRIB2 source into a single-variable
/// cube on a regular lat/lon grid.
#[cfg(feature = "grib")]
pub fn decode_grib(path: &Path) -> Result<DataCube> {
    use crate::raw::{RawDataset, RawVariable};

    let file = std::fs::File::open(path).map_err(|e| {
        Error::decode(format!("GRIB file not found: {} ({e})", path.display()))
    })?;
    let reader = std::io::BufReader::new(file);
    let grib2 = grib::from_reader(reader)
        .map_err(|e| Error::decode(format!("failed to open GRIB {}: {e:?}", path.display())))?;

    let (_index, submessage) = grib2.iter().next().ok_or_else(|| {
        Error::decode(format!("GRIB file has no messages: {}", path.display()))
    })?;
    let latlons: Vec<(f32, f32)> = submessage
        .latlons()
        .map_err(|e| Error::decode(format!("GRIB grid not supported: {e:?}")))?
        .collect();
    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Error::decode(format!("GRIB decoding failed: {e:?}")))?;
    let values: Vec<f32> = decoder
        .dispatch()
        .map_err(|e| Error::decode(format!("GRIB decoding failed: {e:?}")))?
        .collect();
    if latlons.len() != values.len() {
        return Err(Error::decode(
            "GRIB grid size does not match decoded values",
        ));
    }

    // Regular lat/lon scanning: longitudes cycle within each row.
    let first_lon = latlons.first().map(|&(_, lon)| lon).ok_or_else(|| {
        Error::decode(format!("GRIB message has an empty grid: {}", path.display()))
    })?;
    let n_lon = latlons
        .iter()
        .skip(1)
        .position(|&(_, lon)| (lon - first_lon).abs() < 1e-6)
        .map(|p| p + 1)
        .unwrap_or(latlons.len());
    if n_lon == 0 || latlons.len() % n_lon != 0 {
        return Err(Error::decode("GRIB grid is not a regular lat/lon raster"));
    }
    let n_lat = latlons.len() / n_lon;

    let lat: Vec<f64> = (0..n_lat).map(|i| latlons[i * n_lon].0 as f64).collect();
    let lon: Vec<f64> = (0..n_lon).map(|j| latlons[j].1 as f64).collect();

    let mut raw = RawDataset {
        lat,
        lon,
        ..Default::default()
    };
    raw.variables.insert(
        "field".to_string(),
        RawVariable {
            dims: vec!["lat".to_string(), "lon".to_string()],
            data: ndarray::ArrayD::from_shape_vec(
                ndarray::IxDyn(&[n_lat, n_lon]),
                values.into_iter().map(|v| v as f64).collect(),
            )
            .map_err(|e| Error::decode(format!("GRIB grid shape error: {e}")))?,
            units: None,
            long_name: None,
            fill_values: Vec::new(),
        },
    );

    DataCube::from_raw(raw)
}

/// GRIB decoding requires the `grib` cargo feature.
#[cfg(not(feature = "grib"))]
pub fn decode_grib(_path: &Path) -> Result<DataCube> {
    Err(Error::decode(
        "GRIB decoding requires the `grib` cargo feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_source_format() {
        assert_eq!(
            infer_source_format(Path::new("a.nc")).unwrap(),
            SourceFormat::Netcdf
        );
        assert_eq!(
            infer_source_format(Path::new("a.grib2")).unwrap(),
            SourceFormat::Grib
        );
        assert!(infer_source_format(Path::new("a.csv")).is_err());
    }

    #[cfg(not(feature = "grib"))]
    #[test]
    fn test_grib_without_feature_names_the_feature() {
        let err = decode_grib(Path::new("a.grib2")).unwrap_err();
        assert!(err.to_string().contains("grib"));
    }
}
