//! Chunked compressed cube storage
//!
//! The on-disk format is inferred from the path: a `.zarr` suffix or an
//! existing directory selects Zarr, anything else NetCDF. Zarr is the
//! default backend; NetCDF binds libnetcdf and lives behind the `netcdf`
//! cargo feature.

#[cfg(feature = "netcdf")]
pub mod netcdf;
#[cfg(feature = "zarr")]
pub mod zarr;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cube::DataCube;
use crate::error::{Error, Result};

/// Cube serialization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFormat {
    Netcdf,
    Zarr,
}

/// Infer the storage format from a path.
pub fn infer_format(path: &Path) -> CubeFormat {
    if path.is_dir() {
        return CubeFormat::Zarr;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("zarr") => CubeFormat::Zarr,
        _ => CubeFormat::Netcdf,
    }
}

/// Blosc inner codec for the Zarr backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZarrCompressor {
    Zstd,
    Lz4,
    Zlib,
}

impl Default for ZarrCompressor {
    fn default() -> Self {
        ZarrCompressor::Zstd
    }
}

impl FromStr for ZarrCompressor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zstd" => Ok(ZarrCompressor::Zstd),
            "lz4" => Ok(ZarrCompressor::Lz4),
            "zlib" => Ok(ZarrCompressor::Zlib),
            other => Err(Error::storage(format!("unsupported zarr codec: {other:?}"))),
        }
    }
}

/// Per-variable encoding options for cube writes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    pub compression_level: u32,
    pub chunk_time: usize,
    pub chunk_level: usize,
    pub chunk_lat: usize,
    pub chunk_lon: usize,
    pub zarr_compressor: ZarrCompressor,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression_level: 4,
            chunk_time: 1,
            chunk_level: 1,
            chunk_lat: 256,
            chunk_lon: 256,
            zarr_compressor: ZarrCompressor::Zstd,
        }
    }
}

impl WriteOptions {
    /// Chunk shape for a cube, clamped to the actual axis sizes.
    pub fn chunk_shape(&self, cube: &DataCube) -> [usize; 4] {
        let (t, l, lat, lon) = cube.shape();
        [
            t.min(self.chunk_time.max(1)),
            l.min(self.chunk_level.max(1)),
            lat.min(self.chunk_lat.max(1)),
            lon.min(self.chunk_lon.max(1)),
        ]
    }
}

/// Write a cube, inferring the format from the path. Parent directories are
/// created; single-file formats go through a temp path + rename.
pub fn write_cube(cube: &DataCube, path: &Path, options: &WriteOptions) -> Result<PathBuf> {
    match infer_format(path) {
        CubeFormat::Zarr => {
            #[cfg(feature = "zarr")]
            {
                zarr::write(cube, path, options)
            }
            #[cfg(not(feature = "zarr"))]
            {
                let _ = (cube, options);
                Err(Error::storage(
                    "Zarr support requires the `zarr` cargo feature",
                ))
            }
        }
        CubeFormat::Netcdf => {
            #[cfg(feature = "netcdf")]
            {
                netcdf::write(cube, path, options)
            }
            #[cfg(not(feature = "netcdf"))]
            {
                let _ = (cube, options);
                Err(Error::storage(
                    "NetCDF support requires the `netcdf` cargo feature",
                ))
            }
        }
    }
}

/// Open a cube, inferring the format from the path.
pub fn open_cube(path: &Path) -> Result<DataCube> {
    match infer_format(path) {
        CubeFormat::Zarr => {
            #[cfg(feature = "zarr")]
            {
                zarr::open(path)
            }
            #[cfg(not(feature = "zarr"))]
            {
                Err(Error::storage(
                    "Zarr support requires the `zarr` cargo feature",
                ))
            }
        }
        CubeFormat::Netcdf => {
            #[cfg(feature = "netcdf")]
            {
                netcdf::open(path)
            }
            #[cfg(not(feature = "netcdf"))]
            {
                Err(Error::storage(
                    "NetCDF support requires the `netcdf` cargo feature",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_format_by_extension() {
        assert_eq!(infer_format(Path::new("cube.nc")), CubeFormat::Netcdf);
        assert_eq!(infer_format(Path::new("cube.zarr")), CubeFormat::Zarr);
        assert_eq!(infer_format(Path::new("cube.ZARR")), CubeFormat::Zarr);
        assert_eq!(infer_format(Path::new("cube")), CubeFormat::Netcdf);
    }

    #[test]
    fn test_infer_format_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(infer_format(dir.path()), CubeFormat::Zarr);
    }

    #[test]
    fn test_chunk_shape_clamps_to_cube() {
        use chrono::TimeZone;
        let cube = DataCube::new(
            vec![chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()],
            vec![0.0],
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
        )
        .unwrap();
        let opts = WriteOptions::default();
        assert_eq!(opts.chunk_shape(&cube), [1, 1, 3, 2]);
    }

    #[test]
    fn test_zarr_compressor_parse() {
        assert_eq!("zstd".parse::<ZarrCompressor>().unwrap(), ZarrCompressor::Zstd);
        assert_eq!("LZ4".parse::<ZarrCompressor>().unwrap(), ZarrCompressor::Lz4);
        assert!("snappy".parse::<ZarrCompressor>().is_err());
    }
}
