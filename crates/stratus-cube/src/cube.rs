//! The canonical data cube

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array4, Axis};

use crate::codec::{self, WriteOptions};
use crate::error::{Error, Result};

/// A data variable on the cube grid.
///
/// Data is always `(time, level, lat, lon)` float32 with NaN for missing
/// cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub data: Array4<f32>,
    pub units: Option<String>,
    pub long_name: Option<String>,
}

impl Variable {
    /// Create a variable without attributes.
    pub fn new(data: Array4<f32>) -> Self {
        Self {
            data,
            units: None,
            long_name: None,
        }
    }

    /// Attach a units attribute.
    pub fn with_units<S: Into<String>>(mut self, units: S) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Attach a long-name attribute.
    pub fn with_long_name<S: Into<String>>(mut self, long_name: S) -> Self {
        self.long_name = Some(long_name.into());
        self
    }
}

/// The canonical gridded dataset: dims `(time, level, lat, lon)`, float32
/// data, NaN missing values, monotonic 1-D coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DataCube {
    time: Vec<DateTime<Utc>>,
    level: Vec<f64>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    variables: BTreeMap<String, Variable>,
}

impl DataCube {
    /// Create an empty cube over the given coordinates.
    pub fn new(
        time: Vec<DateTime<Utc>>,
        level: Vec<f64>,
        lat: Vec<f64>,
        lon: Vec<f64>,
    ) -> Result<Self> {
        let cube = Self {
            time,
            level,
            lat,
            lon,
            variables: BTreeMap::new(),
        };
        cube.validate()?;
        Ok(cube)
    }

    /// Build a canonical cube from decoder output. See [`crate::raw`].
    pub fn from_raw(raw: crate::raw::RawDataset) -> Result<Self> {
        crate::raw::normalize(raw)
    }

    /// Open a cube from disk, inferring the format from the path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        codec::open_cube(path.as_ref())
    }

    /// Write the cube to disk, inferring the format from the path.
    pub fn write(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<PathBuf> {
        self.validate()?;
        codec::write_cube(self, path.as_ref(), options)
    }

    pub fn time(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    pub fn level(&self) -> &[f64] {
        &self.level
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// Expected variable shape `(time, level, lat, lon)`.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (
            self.time.len(),
            self.level.len(),
            self.lat.len(),
            self.lon.len(),
        )
    }

    /// Data variables in name order.
    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Whether a variable exists.
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Add a variable, validating its shape against the cube grid.
    pub fn add_variable(&mut self, name: impl Into<String>, variable: Variable) -> Result<()> {
        let name = name.into();
        let expected = [
            self.time.len(),
            self.level.len(),
            self.lat.len(),
            self.lon.len(),
        ];
        if variable.data.shape() != expected {
            return Err(Error::validation(format!(
                "variable {name:?} shape {:?} does not match cube shape {expected:?}",
                variable.data.shape()
            )));
        }
        self.variables.insert(name, variable);
        Ok(())
    }

    /// Remove and return a variable.
    pub fn remove_variable(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }

    /// A `(lat, lon)` slice of a variable at the given time and level
    /// indices.
    pub fn slice(&self, name: &str, time_idx: usize, level_idx: usize) -> Result<Array2<f32>> {
        let var = self
            .variables
            .get(name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown variable: {name}")))?;
        if time_idx >= self.time.len() {
            return Err(Error::invalid_argument(format!(
                "time index {time_idx} out of range (len {})",
                self.time.len()
            )));
        }
        if level_idx >= self.level.len() {
            return Err(Error::invalid_argument(format!(
                "level index {level_idx} out of range (len {})",
                self.level.len()
            )));
        }
        Ok(var
            .data
            .index_axis(Axis(0), time_idx)
            .index_axis(Axis(0), level_idx)
            .to_owned())
    }

    /// Check cube invariants: non-empty strictly monotonic coordinates and
    /// consistent variable shapes.
    pub fn validate(&self) -> Result<()> {
        if self.time.is_empty() {
            return Err(Error::validation("time coordinate is empty"));
        }
        if self.level.is_empty() {
            return Err(Error::validation("level coordinate is empty"));
        }
        if self.lat.is_empty() {
            return Err(Error::validation("lat coordinate is empty"));
        }
        if self.lon.is_empty() {
            return Err(Error::validation("lon coordinate is empty"));
        }
        check_strictly_monotonic("lat", &self.lat)?;
        check_strictly_monotonic("lon", &self.lon)?;
        check_strictly_monotonic("level", &self.level)?;
        if self.time.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::validation("time coordinate must be strictly increasing"));
        }
        let expected = [
            self.time.len(),
            self.level.len(),
            self.lat.len(),
            self.lon.len(),
        ];
        for (name, var) in &self.variables {
            if var.data.shape() != expected {
                return Err(Error::validation(format!(
                    "variable {name:?} shape {:?} does not match cube shape {expected:?}",
                    var.data.shape()
                )));
            }
        }
        Ok(())
    }

    /// Attach wind speed/direction derived from `u_name`/`v_name`. No-op
    /// when either component is missing or both outputs already exist.
    pub fn derive_wind(&mut self, u_name: &str, v_name: &str) -> Result<bool> {
        if self.has_variable("wind_speed") || self.has_variable("wind_dir") {
            return Ok(false);
        }
        let (u, v) = match (self.variables.get(u_name), self.variables.get(v_name)) {
            (Some(u), Some(v)) => (u, v),
            _ => return Ok(false),
        };
        let speed = crate::derive::wind::derive_wind_speed(u, v)?;
        let dir = crate::derive::wind::derive_wind_dir(u, v)?;
        self.add_variable("wind_speed", speed)?;
        self.add_variable("wind_dir", dir)?;
        Ok(true)
    }

    /// Attach `precipitation_amount` derived from cumulative `tp_name`.
    /// No-op when the source is missing or the output already exists.
    pub fn derive_precipitation_amount(&mut self, tp_name: &str) -> Result<bool> {
        if self.has_variable("precipitation_amount") {
            return Ok(false);
        }
        let tp = match self.variables.get(tp_name) {
            Some(tp) => tp,
            None => return Ok(false),
        };
        let amount =
            crate::derive::precip::precipitation_amount_from_accumulation(tp, Some(0.0), true)?;
        self.add_variable("precipitation_amount", amount)?;
        Ok(true)
    }
}

fn check_strictly_monotonic(name: &str, values: &[f64]) -> Result<()> {
    if values.len() < 2 {
        return Ok(());
    }
    let ascending = values.windows(2).all(|w| w[0] < w[1]);
    let descending = values.windows(2).all(|w| w[0] > w[1]);
    if !ascending && !descending {
        return Err(Error::validation(format!(
            "{name} coordinate must be strictly monotonic"
        )));
    }
    Ok(())
}
