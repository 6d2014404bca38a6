//! # Stratus Cube
//!
//! The canonical gridded dataset of the Stratus pipeline and its storage
//! codecs.
//!
//! A [`DataCube`] always carries the four dimensions `(time, level, lat,
//! lon)`; data variables are 32-bit floats and missing values are canonical
//! NaN. Cubes are built from decoder output ([`RawDataset`]) which may use
//! axis aliases, unsorted/unwrapped longitudes and sentinel missing values —
//! [`DataCube::from_raw`] normalizes all of that away and attaches derived
//! fields (wind speed/direction, precipitation amounts) where their source
//! variables are present.
//!
//! Serialization goes through [`codec`]: chunked compressed Zarr (default)
//! or NetCDF (behind the `netcdf` cargo feature).

#![warn(clippy::all)]

pub mod codec;
pub mod cube;
pub mod decode;
pub mod derive;
pub mod error;
pub mod raw;

pub use cube::{DataCube, Variable};
pub use error::{Error, Result};
pub use raw::{RawDataset, RawVariable};
