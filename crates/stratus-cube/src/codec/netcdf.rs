//! NetCDF cube backend (requires the `netcdf` cargo feature)
//!
//! Classic CF-ish layout: dimensions `(time, level, lat, lon)`, coordinate
//! variables of the same names (`time` as i64 seconds since the epoch), and
//! one deflate-compressed, shuffled, chunked f32 variable per data field.
//! Writes land on a temp path first and are renamed into place.

use std::path::{Path, PathBuf};

use chrono::TimeZone;
use ndarray::Array4;
use tracing::debug;

use crate::codec::WriteOptions;
use crate::cube::{DataCube, Variable};
use crate::error::{Error, Result};

const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";

fn nerr<E: std::fmt::Display>(err: E) -> Error {
    Error::storage(err.to_string())
}

/// Write a cube to a NetCDF file at `path`.
pub fn write(cube: &DataCube, path: &Path, options: &WriteOptions) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("nc.tmp");
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    {
        let mut file = netcdf::create(&tmp_path).map_err(nerr)?;
        let (n_time, n_level, n_lat, n_lon) = cube.shape();
        file.add_dimension("time", n_time).map_err(nerr)?;
        file.add_dimension("level", n_level).map_err(nerr)?;
        file.add_dimension("lat", n_lat).map_err(nerr)?;
        file.add_dimension("lon", n_lon).map_err(nerr)?;

        let secs: Vec<i64> = cube.time().iter().map(|t| t.timestamp()).collect();
        let mut time_var = file.add_variable::<i64>("time", &["time"]).map_err(nerr)?;
        time_var.put_values(&secs, ..).map_err(nerr)?;
        time_var.put_attribute("units", TIME_UNITS).map_err(nerr)?;

        for (name, values) in [
            ("level", cube.level()),
            ("lat", cube.lat()),
            ("lon", cube.lon()),
        ] {
            let mut var = file.add_variable::<f64>(name, &[name]).map_err(nerr)?;
            var.put_values(values, ..).map_err(nerr)?;
        }

        let chunks = options.chunk_shape(cube);
        for (name, variable) in cube.variables() {
            let mut var = file
                .add_variable::<f32>(name, &["time", "level", "lat", "lon"])
                .map_err(nerr)?;
            var.set_compression(options.compression_level as i32, true)
                .map_err(nerr)?;
            var.set_chunking(&chunks).map_err(nerr)?;
            let elements: Vec<f32> = variable.data.iter().copied().collect();
            var.put_values(&elements, ..).map_err(nerr)?;
            if let Some(units) = &variable.units {
                var.put_attribute("units", units.as_str()).map_err(nerr)?;
            }
            if let Some(long_name) = &variable.long_name {
                var.put_attribute("long_name", long_name.as_str())
                    .map_err(nerr)?;
            }
        }
    }

    std::fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), "wrote netcdf cube");
    Ok(path.to_path_buf())
}

fn attr_string(var: &netcdf::Variable<'_>, name: &str) -> Option<String> {
    let attr = var.attribute(name)?;
    match attr.value().ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// Open a NetCDF cube written by [`write`].
pub fn open(path: &Path) -> Result<DataCube> {
    if !path.is_file() {
        return Err(Error::storage(format!(
            "netcdf file not found: {}",
            path.display()
        )));
    }
    let file = netcdf::open(path).map_err(nerr)?;

    let time_var = file
        .variable("time")
        .ok_or_else(|| Error::storage("netcdf cube missing time variable"))?;
    let secs = time_var.get_values::<i64, _>(..).map_err(nerr)?;
    let time = secs
        .into_iter()
        .map(|s| {
            chrono::Utc
                .timestamp_opt(s, 0)
                .single()
                .ok_or_else(|| Error::storage(format!("invalid time value: {s}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut coords = Vec::with_capacity(3);
    for name in ["level", "lat", "lon"] {
        let var = file
            .variable(name)
            .ok_or_else(|| Error::storage(format!("netcdf cube missing {name} variable")))?;
        coords.push(var.get_values::<f64, _>(..).map_err(nerr)?);
    }
    let lon = coords.pop().expect("lon");
    let lat = coords.pop().expect("lat");
    let level = coords.pop().expect("level");

    let mut cube = DataCube::new(time, level, lat, lon)?;
    let (n_time, n_level, n_lat, n_lon) = cube.shape();

    for var in file.variables() {
        let name = var.name();
        if matches!(name.as_str(), "time" | "level" | "lat" | "lon") {
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if dims != ["time", "level", "lat", "lon"] {
            return Err(Error::storage(format!(
                "variable {name:?} has unexpected dimensions {dims:?}"
            )));
        }
        let elements = var.get_values::<f32, _>(..).map_err(nerr)?;
        let data = Array4::from_shape_vec((n_time, n_level, n_lat, n_lon), elements)
            .map_err(|e| Error::storage(format!("variable {name:?} shape error: {e}")))?;
        let variable = Variable {
            data,
            units: attr_string(&var, "units"),
            long_name: attr_string(&var, "long_name"),
        };
        cube.add_variable(name, variable)?;
    }

    Ok(cube)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ndarray::Array4;

    #[test]
    fn test_netcdf_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.nc");

        let mut cube = DataCube::new(
            vec![
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 1, 1, 6, 0, 0).unwrap(),
            ],
            vec![0.0],
            vec![-10.0, 0.0, 10.0],
            vec![100.0, 110.0],
        )
        .unwrap();
        let mut data = Array4::zeros((2, 1, 3, 2));
        data[[0, 0, 1, 1]] = 2.25;
        data[[1, 0, 0, 0]] = f32::NAN;
        cube.add_variable("t2m", Variable::new(data).with_units("K"))
            .unwrap();

        cube.write(&path, &WriteOptions::default()).unwrap();
        let opened = DataCube::open(&path).unwrap();

        assert_eq!(opened.time(), cube.time());
        assert_eq!(opened.lat(), cube.lat());
        assert_eq!(opened.lon(), cube.lon());
        let var = opened.variable("t2m").unwrap();
        assert_eq!(var.units.as_deref(), Some("K"));
        assert_eq!(var.data[[0, 0, 1, 1]], 2.25);
        assert!(var.data[[1, 0, 0, 0]].is_nan());
    }
}
