//! Decoder output and normalization into the canonical cube
//!
//! A [`RawDataset`] is what the format decoders hand over: axis names may be
//! aliases (`longitude`, `valid_time`, …), longitudes may be on a [0, 360)
//! grid in any order, data may be any float width and missing cells are
//! marked with sentinel values. [`normalize`] turns that into a canonical
//! [`DataCube`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ndarray::{Array4, ArrayD, Axis, IxDyn};

use crate::cube::{DataCube, Variable};
use crate::error::{Error, Result};

/// Canonical dimension order of the cube.
pub const CANONICAL_DIMS: [&str; 4] = ["time", "level", "lat", "lon"];

/// A raw data variable as read from a source file.
#[derive(Debug, Clone)]
pub struct RawVariable {
    /// Dimension names, possibly aliased, in storage order.
    pub dims: Vec<String>,
    /// Values in storage order; width is whatever the source used.
    pub data: ArrayD<f64>,
    pub units: Option<String>,
    pub long_name: Option<String>,
    /// Sentinels marking missing cells (`_FillValue`, `missing_value` and
    /// any extras listed in the source encoding).
    pub fill_values: Vec<f64>,
}

/// A raw dataset as read from a source file.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    /// Time axis; absent for static fields.
    pub time: Option<Vec<DateTime<Utc>>>,
    /// Vertical axis; absent for surface-only fields.
    pub level: Option<Vec<f64>>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub variables: BTreeMap<String, RawVariable>,
}

/// Map a dimension name (possibly an alias) to its canonical name.
pub fn canonical_dim(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "time" | "valid_time" | "forecast_time" => Some("time"),
        "level" | "lev" | "isobaricinhpa" | "pressure_level" => Some("level"),
        "lat" | "latitude" => Some("lat"),
        "lon" | "long" | "longitude" => Some("lon"),
        _ => None,
    }
}

/// Wrap a longitude into [-180, 180).
pub fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Ascending sort permutation of a coordinate array.
pub fn argsort(values: &[f64]) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..values.len()).collect();
    perm.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    perm
}

fn apply_perm(values: &[f64], perm: &[usize]) -> Vec<f64> {
    perm.iter().map(|&i| values[i]).collect()
}

/// Expand a raw variable to the canonical 4-D shape, inserting length-1
/// axes for missing dimensions. Dimension order must follow the canonical
/// order.
fn to_canonical_4d(name: &str, var: &RawVariable) -> Result<Array4<f64>> {
    let mut canonical: Vec<&'static str> = Vec::with_capacity(var.dims.len());
    for dim in &var.dims {
        let mapped = canonical_dim(dim).ok_or_else(|| {
            Error::validation(format!("variable {name:?} has unknown dimension {dim:?}"))
        })?;
        canonical.push(mapped);
    }

    // Dims must appear in canonical relative order; sources in the wild do.
    let mut prev: Option<usize> = None;
    for dim in &canonical {
        let pos = CANONICAL_DIMS
            .iter()
            .position(|c| c == dim)
            .expect("canonical name");
        if let Some(p) = prev {
            if pos <= p {
                return Err(Error::validation(format!(
                    "variable {name:?} dimensions {:?} are not in (time, level, lat, lon) order",
                    var.dims
                )));
            }
        }
        prev = Some(pos);
    }

    let mut data = var.data.clone();
    for (idx, &dim) in CANONICAL_DIMS.iter().enumerate() {
        if !canonical.contains(&dim) {
            data = data.insert_axis(Axis(idx));
            canonical.insert(idx, dim);
        }
    }
    data.into_dimensionality::<ndarray::Ix4>().map_err(|_| {
        Error::validation(format!(
            "variable {name:?} could not be shaped to 4-D (dims {:?})",
            var.dims
        ))
    })
}

/// Normalize a raw dataset into a canonical [`DataCube`].
pub fn normalize(raw: RawDataset) -> Result<DataCube> {
    let time = raw
        .time
        .clone()
        .unwrap_or_else(|| vec![DateTime::<Utc>::UNIX_EPOCH]);
    let level = raw.level.clone().unwrap_or_else(|| vec![0.0]);

    let wrapped_lon: Vec<f64> = raw.lon.iter().map(|&l| wrap_lon(l)).collect();
    let lon_perm = argsort(&wrapped_lon);
    let lon = apply_perm(&wrapped_lon, &lon_perm);

    let lat_perm = argsort(&raw.lat);
    let lat = apply_perm(&raw.lat, &lat_perm);

    let mut cube = DataCube::new(time.clone(), level.clone(), lat, lon)?;
    let expected = [time.len(), level.len(), raw.lat.len(), raw.lon.len()];

    for (name, var) in &raw.variables {
        let data = to_canonical_4d(name, var)?;
        if data.shape() != expected {
            return Err(Error::validation(format!(
                "variable {name:?} shape {:?} does not match coordinates {expected:?}",
                data.shape()
            )));
        }
        let data = data.select(Axis(2), &lat_perm).select(Axis(3), &lon_perm);

        let sentinels = &var.fill_values;
        let data = data.mapv(|v| {
            if sentinels.iter().any(|&s| v == s) {
                f32::NAN
            } else {
                v as f32
            }
        });

        cube.add_variable(
            name.clone(),
            Variable {
                data,
                units: var.units.clone(),
                long_name: var.long_name.clone(),
            },
        )?;
    }

    // Derived fields attach only when their sources are present.
    if !cube.derive_wind("u10", "v10")? {
        cube.derive_wind("u", "v")?;
    }
    cube.derive_precipitation_amount("tp")?;

    Ok(cube)
}

/// Convenience constructor for a surface variable on a plain grid.
pub fn surface_variable(
    dims: &[&str],
    shape: &[usize],
    values: Vec<f64>,
) -> Result<RawVariable> {
    let data = ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| Error::invalid_argument(format!("bad variable shape: {e}")))?;
    Ok(RawVariable {
        dims: dims.iter().map(|s| s.to_string()).collect(),
        data,
        units: None,
        long_name: None,
        fill_values: Vec::new(),
    })
}
