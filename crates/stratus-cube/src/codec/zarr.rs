//! Zarr cube backend
//!
//! Cubes are stored as a flat group: coordinate arrays (`time` as i64
//! seconds since the epoch, `level`/`lat`/`lon` as f64) plus one chunked
//! Blosc-compressed f32 array per data variable. The group attributes carry
//! the data-variable list so opening does not need to walk the hierarchy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::TimeZone;
use ndarray::Array4;
use serde_json::{json, Map, Value};
use tracing::debug;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::codec::{WriteOptions, ZarrCompressor};
use crate::cube::{DataCube, Variable};
use crate::error::{Error, Result};

const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";

fn zerr<E: std::fmt::Display>(err: E) -> Error {
    Error::storage(err.to_string())
}

fn blosc_compressor(compressor: ZarrCompressor) -> BloscCompressor {
    match compressor {
        ZarrCompressor::Zstd => BloscCompressor::Zstd,
        ZarrCompressor::Lz4 => BloscCompressor::LZ4,
        ZarrCompressor::Zlib => BloscCompressor::Zlib,
    }
}

fn write_coord_f64(store: &Arc<FilesystemStore>, path: &str, values: &[f64]) -> Result<()> {
    let shape = vec![values.len() as u64];
    let array = ArrayBuilder::new(
        shape.clone(),
        DataType::Float64,
        vec![values.len() as u64].try_into().map_err(zerr)?,
        FillValue::from(f64::NAN),
    )
    .build(store.clone(), path)
    .map_err(zerr)?;
    array.store_metadata().map_err(zerr)?;
    array
        .store_array_subset_elements::<f64>(&ArraySubset::new_with_shape(shape), values)
        .map_err(zerr)?;
    Ok(())
}

fn write_time(store: &Arc<FilesystemStore>, secs: &[i64]) -> Result<()> {
    let shape = vec![secs.len() as u64];
    let mut attrs = Map::new();
    attrs.insert("units".to_string(), json!(TIME_UNITS));
    let array = ArrayBuilder::new(
        shape.clone(),
        DataType::Int64,
        vec![secs.len() as u64].try_into().map_err(zerr)?,
        FillValue::from(0i64),
    )
    .attributes(attrs)
    .build(store.clone(), "/time")
    .map_err(zerr)?;
    array.store_metadata().map_err(zerr)?;
    array
        .store_array_subset_elements::<i64>(&ArraySubset::new_with_shape(shape), secs)
        .map_err(zerr)?;
    Ok(())
}

fn write_variable(
    store: &Arc<FilesystemStore>,
    name: &str,
    variable: &Variable,
    chunks: &[usize; 4],
    options: &WriteOptions,
) -> Result<()> {
    let shape: Vec<u64> = variable.data.shape().iter().map(|&s| s as u64).collect();
    let chunk_shape: Vec<u64> = chunks.iter().map(|&s| s as u64).collect();

    let blosc = BloscCodec::new(
        blosc_compressor(options.zarr_compressor),
        (options.compression_level.min(9) as u8)
            .try_into()
            .map_err(zerr)?,
        None,
        BloscShuffleMode::BitShuffle,
        Some(std::mem::size_of::<f32>()),
    )
    .map_err(zerr)?;

    let mut attrs = Map::new();
    if let Some(units) = &variable.units {
        attrs.insert("units".to_string(), json!(units));
    }
    if let Some(long_name) = &variable.long_name {
        attrs.insert("long_name".to_string(), json!(long_name));
    }

    let array = ArrayBuilder::new(
        shape.clone(),
        DataType::Float32,
        chunk_shape.try_into().map_err(zerr)?,
        FillValue::from(f32::NAN),
    )
    .bytes_to_bytes_codecs(vec![Arc::new(blosc)])
    .dimension_names(["time", "level", "lat", "lon"].into())
    .attributes(attrs)
    .build(store.clone(), &format!("/{name}"))
    .map_err(zerr)?;
    array.store_metadata().map_err(zerr)?;

    let elements: Vec<f32> = variable.data.iter().copied().collect();
    array
        .store_array_subset_elements::<f32>(&ArraySubset::new_with_shape(shape), &elements)
        .map_err(zerr)?;
    Ok(())
}

/// Write a cube as a Zarr hierarchy at `path`, replacing any existing store.
pub fn write(cube: &DataCube, path: &Path, options: &WriteOptions) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)?;

    let store = Arc::new(FilesystemStore::new(path).map_err(zerr)?);

    let names: Vec<String> = cube.variables().keys().cloned().collect();
    let mut attrs = Map::new();
    attrs.insert("data_variables".to_string(), json!(names));
    let group = GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")
        .map_err(zerr)?;
    group.store_metadata().map_err(zerr)?;

    let secs: Vec<i64> = cube.time().iter().map(|t| t.timestamp()).collect();
    write_time(&store, &secs)?;
    write_coord_f64(&store, "/level", cube.level())?;
    write_coord_f64(&store, "/lat", cube.lat())?;
    write_coord_f64(&store, "/lon", cube.lon())?;

    let chunks = options.chunk_shape(cube);
    for (name, variable) in cube.variables() {
        write_variable(&store, name, variable, &chunks, options)?;
    }

    debug!(path = %path.display(), variables = names.len(), "wrote zarr cube");
    Ok(path.to_path_buf())
}

fn read_coord_f64(store: &Arc<FilesystemStore>, path: &str) -> Result<Vec<f64>> {
    let array = Array::open(store.clone(), path).map_err(zerr)?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<f64>(&subset)
        .map_err(zerr)
}

fn read_time(store: &Arc<FilesystemStore>) -> Result<Vec<chrono::DateTime<chrono::Utc>>> {
    let array = Array::open(store.clone(), "/time").map_err(zerr)?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    let secs = array
        .retrieve_array_subset_elements::<i64>(&subset)
        .map_err(zerr)?;
    secs.into_iter()
        .map(|s| {
            chrono::Utc
                .timestamp_opt(s, 0)
                .single()
                .ok_or_else(|| Error::storage(format!("invalid time value: {s}")))
        })
        .collect()
}

fn attr_string(attrs: &Map<String, Value>, key: &str) -> Option<String> {
    attrs.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Open a Zarr cube written by [`write`].
pub fn open(path: &Path) -> Result<DataCube> {
    if !path.is_dir() {
        return Err(Error::storage(format!(
            "zarr store not found: {}",
            path.display()
        )));
    }
    let store = Arc::new(FilesystemStore::new(path).map_err(zerr)?);
    let group = Group::open(store.clone(), "/").map_err(zerr)?;
    let names: Vec<String> = group
        .attributes()
        .get("data_variables")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| {
            Error::storage(format!(
                "zarr store missing data_variables attribute: {}",
                path.display()
            ))
        })?;

    let time = read_time(&store)?;
    let level = read_coord_f64(&store, "/level")?;
    let lat = read_coord_f64(&store, "/lat")?;
    let lon = read_coord_f64(&store, "/lon")?;
    let mut cube = DataCube::new(time, level, lat, lon)?;

    for name in names {
        let array = Array::open(store.clone(), &format!("/{name}")).map_err(zerr)?;
        let shape: Vec<usize> = array.shape().iter().map(|&s| s as usize).collect();
        if shape.len() != 4 {
            return Err(Error::storage(format!(
                "variable {name:?} is not 4-dimensional"
            )));
        }
        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let elements = array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(zerr)?;
        let data = Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), elements)
            .map_err(|e| Error::storage(format!("variable {name:?} shape error: {e}")))?;
        let variable = Variable {
            data,
            units: attr_string(array.attributes(), "units"),
            long_name: attr_string(array.attributes(), "long_name"),
        };
        cube.add_variable(name, variable)?;
    }

    Ok(cube)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::Array4;

    fn sample_cube() -> DataCube {
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
        data[[0, 0, 0, 0]] = 1.5;
        data[[1, 0, 2, 1]] = f32::NAN;
        cube.add_variable(
            "t2m",
            Variable::new(data).with_units("K").with_long_name("2m temperature"),
        )
        .unwrap();
        cube
    }

    #[test]
    fn test_zarr_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.zarr");
        let cube = sample_cube();
        cube.write(&path, &WriteOptions::default()).unwrap();

        let opened = DataCube::open(&path).unwrap();
        assert_eq!(opened.time(), cube.time());
        assert_eq!(opened.level(), cube.level());
        assert_eq!(opened.lat(), cube.lat());
        assert_eq!(opened.lon(), cube.lon());

        let var = opened.variable("t2m").unwrap();
        assert_eq!(var.units.as_deref(), Some("K"));
        assert_eq!(var.long_name.as_deref(), Some("2m temperature"));
        assert_eq!(var.data[[0, 0, 0, 0]], 1.5);
        assert!(var.data[[1, 0, 2, 1]].is_nan());
    }

    #[test]
    fn test_zarr_roundtrip_all_compressors() {
        for compressor in [ZarrCompressor::Zstd, ZarrCompressor::Lz4, ZarrCompressor::Zlib] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("cube.zarr");
            let options = WriteOptions {
                zarr_compressor: compressor,
                ..WriteOptions::default()
            };
            let cube = sample_cube();
            cube.write(&path, &options).unwrap();
            let opened = DataCube::open(&path).unwrap();
            assert_eq!(opened.variable("t2m").unwrap().data[[0, 0, 0, 0]], 1.5);
        }
    }

    #[test]
    fn test_open_missing_store_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataCube::open(dir.path().join("absent.zarr")).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_write_replaces_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.zarr");
        let cube = sample_cube();
        cube.write(&path, &WriteOptions::default()).unwrap();

        let mut smaller = sample_cube();
        smaller.remove_variable("t2m");
        smaller
            .add_variable("tp", Variable::new(Array4::zeros((2, 1, 3, 2))))
            .unwrap();
        smaller.write(&path, &WriteOptions::default()).unwrap();

        let opened = DataCube::open(&path).unwrap();
        assert!(opened.variable("t2m").is_none());
        assert!(opened.variable("tp").is_some());
    }
}
