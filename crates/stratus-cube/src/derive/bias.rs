//! Forecast − observation bias grids
//!
//! Observations arrive on their own grid and time axis; they are normalized
//! (longitudes wrapped and sorted), interpolated in time to the forecast
//! valid time and resampled to the forecast grid (nearest neighbor) before
//! the bias field is computed.

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Axis};

use crate::error::{Error, Result};
use crate::raw::{argsort, wrap_lon};

/// How the bias field is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasMode {
    /// `forecast - observation`
    Difference,
    /// `(forecast - observation) / observation * scale`, masked near zero
    RelativeError,
}

/// An observation field on its own grid. `time` is `None` for a single
/// static field, in which case `values` has a length-1 time axis.
#[derive(Debug, Clone)]
pub struct ObservationGrid {
    pub time: Option<Vec<DateTime<Utc>>>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// `(time, lat, lon)`
    pub values: Array3<f32>,
}

/// A bias field aligned to the forecast grid.
#[derive(Debug, Clone)]
pub struct BiasGrid {
    pub bias: Array2<f32>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
}

/// Wrap longitudes into [-180, 180) and sort both axes ascending,
/// reordering `values` to match.
pub fn normalize_lat_lon(
    values: &Array2<f32>,
    lat: &[f64],
    lon: &[f64],
) -> Result<(Array2<f32>, Vec<f64>, Vec<f64>)> {
    if values.shape() != [lat.len(), lon.len()] {
        return Err(Error::invalid_argument(format!(
            "grid shape {:?} does not match coordinates ({}, {})",
            values.shape(),
            lat.len(),
            lon.len()
        )));
    }
    let wrapped: Vec<f64> = lon.iter().map(|&l| wrap_lon(l)).collect();
    let lon_perm = argsort(&wrapped);
    let lat_perm = argsort(lat);

    let out = values.select(Axis(0), &lat_perm).select(Axis(1), &lon_perm);
    let lat_sorted: Vec<f64> = lat_perm.iter().map(|&i| lat[i]).collect();
    let lon_sorted: Vec<f64> = lon_perm.iter().map(|&i| wrapped[i]).collect();
    Ok((out, lat_sorted, lon_sorted))
}

/// Index of the value in sorted `coords` nearest to `target`.
fn nearest_index(coords: &[f64], target: f64) -> usize {
    match coords
        .binary_search_by(|probe| probe.partial_cmp(&target).unwrap_or(std::cmp::Ordering::Less))
    {
        Ok(idx) => idx,
        Err(idx) => {
            if idx == 0 {
                0
            } else if idx >= coords.len() {
                coords.len() - 1
            } else if (coords[idx] - target).abs() < (target - coords[idx - 1]).abs() {
                idx
            } else {
                idx - 1
            }
        }
    }
}

/// Nearest-neighbor resample of `values` from `(src_lat, src_lon)` onto
/// `(dst_lat, dst_lon)`. Source coordinates must be sorted ascending.
pub fn resample_nearest(
    values: &Array2<f32>,
    src_lat: &[f64],
    src_lon: &[f64],
    dst_lat: &[f64],
    dst_lon: &[f64],
) -> Array2<f32> {
    let lat_idx: Vec<usize> = dst_lat.iter().map(|&l| nearest_index(src_lat, l)).collect();
    let lon_idx: Vec<usize> = dst_lon.iter().map(|&l| nearest_index(src_lon, l)).collect();
    Array2::from_shape_fn((dst_lat.len(), dst_lon.len()), |(i, j)| {
        values[[lat_idx[i], lon_idx[j]]]
    })
}

/// Linearly interpolate the observation stack to `target_time`. Times
/// outside the observed range clamp to the nearest end.
pub fn interpolate_observation_time(
    obs: &ObservationGrid,
    target_time: DateTime<Utc>,
) -> Result<Array2<f32>> {
    let n_time = obs.values.len_of(Axis(0));
    if n_time == 0 {
        return Err(Error::invalid_argument("observation has no time steps"));
    }
    let times = match &obs.time {
        None => return Ok(obs.values.index_axis(Axis(0), 0).to_owned()),
        Some(times) => {
            if times.len() != n_time {
                return Err(Error::invalid_argument(format!(
                    "observation time axis length {} does not match values {}",
                    times.len(),
                    n_time
                )));
            }
            times
        }
    };

    if target_time <= times[0] {
        return Ok(obs.values.index_axis(Axis(0), 0).to_owned());
    }
    if target_time >= times[n_time - 1] {
        return Ok(obs.values.index_axis(Axis(0), n_time - 1).to_owned());
    }

    let hi = times.partition_point(|&t| t <= target_time);
    let lo = hi - 1;
    let span = (times[hi] - times[lo]).num_seconds() as f32;
    let frac = (target_time - times[lo]).num_seconds() as f32 / span;

    let a = obs.values.index_axis(Axis(0), lo);
    let b = obs.values.index_axis(Axis(0), hi);
    let mut out = a.to_owned();
    out.zip_mut_with(&b, |x, &y| *x = *x + (y - *x) * frac);
    Ok(out)
}

/// Normalize and align an observation to the forecast grid at
/// `target_time`.
pub fn align_observation_to_forecast(
    fc_lat: &[f64],
    fc_lon: &[f64],
    obs: &ObservationGrid,
    target_time: DateTime<Utc>,
) -> Result<Array2<f32>> {
    if obs.lat.is_empty() || obs.lon.is_empty() {
        return Err(Error::invalid_argument(
            "observation missing required dims lat/lon",
        ));
    }
    let at_time = interpolate_observation_time(obs, target_time)?;
    let (normalized, lat, lon) = normalize_lat_lon(&at_time, &obs.lat, &obs.lon)?;
    Ok(resample_nearest(&normalized, &lat, &lon, fc_lat, fc_lon))
}

/// Bias between aligned forecast and observation grids.
pub fn compute_bias(
    forecast: &Array2<f32>,
    observation: &Array2<f32>,
    mode: BiasMode,
    relative_epsilon: f64,
    relative_scale: f64,
) -> Result<Array2<f32>> {
    if forecast.shape() != observation.shape() {
        return Err(Error::invalid_argument(format!(
            "forecast shape {:?} does not match observation shape {:?}",
            forecast.shape(),
            observation.shape()
        )));
    }
    let mut out = forecast.clone();
    match mode {
        BiasMode::Difference => {
            out.zip_mut_with(observation, |f, &o| *f -= o);
        }
        BiasMode::RelativeError => {
            let eps = relative_epsilon as f32;
            let scale = relative_scale as f32;
            out.zip_mut_with(observation, |f, &o| {
                if o.abs() < eps {
                    *f = f32::NAN;
                } else {
                    *f = (*f - o) / o * scale;
                }
            });
        }
    }
    Ok(out)
}

/// Full bias derivation: align the observation to the forecast grid and
/// subtract.
pub fn derive_bias_grid(
    forecast: &Array2<f32>,
    fc_lat: &[f64],
    fc_lon: &[f64],
    obs: &ObservationGrid,
    target_time: DateTime<Utc>,
) -> Result<BiasGrid> {
    if forecast.shape() != [fc_lat.len(), fc_lon.len()] {
        return Err(Error::invalid_argument(format!(
            "forecast shape {:?} does not match coordinates ({}, {})",
            forecast.shape(),
            fc_lat.len(),
            fc_lon.len()
        )));
    }
    let aligned = align_observation_to_forecast(fc_lat, fc_lon, obs, target_time)?;
    let bias = compute_bias(forecast, &aligned, BiasMode::Difference, 0.0, 1.0)?;
    Ok(BiasGrid {
        bias,
        lat: fc_lat.to_vec(),
        lon: fc_lon.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_lat_lon_wraps_and_sorts() {
        let values =
            Array2::from_shape_vec((1, 4), vec![0.0f32, 1.0, 2.0, 3.0]).unwrap();
        let (out, lat, lon) =
            normalize_lat_lon(&values, &[0.0], &[0.0, 90.0, 180.0, 270.0]).unwrap();
        assert_eq!(lat, vec![0.0]);
        assert_eq!(lon, vec![-180.0, -90.0, 0.0, 90.0]);
        assert_eq!(out.row(0).to_vec(), vec![2.0, 3.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bias_aligns_time_and_space() {
        let target = Utc.with_ymd_and_hms(2026, 1, 1, 0, 30, 0).unwrap();

        let fc_lat = [0.0, 1.0];
        let fc_lon = [0.0, 1.0];
        let forecast =
            Array2::from_shape_vec((2, 2), vec![10.0f32, 11.0, 11.0, 12.0]).unwrap();

        let obs_lat = vec![0.0, 0.5, 1.0];
        let obs_lon = vec![0.0, 0.5, 1.0];
        let base = |i: usize, j: usize| obs_lat[i] as f32 + obs_lon[j] as f32;
        let mut values = Array3::zeros((2, 3, 3));
        for i in 0..3 {
            for j in 0..3 {
                values[[0, i, j]] = base(i, j);
                values[[1, i, j]] = base(i, j) + 2.0;
            }
        }
        let obs = ObservationGrid {
            time: Some(vec![
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap(),
            ]),
            lat: obs_lat,
            lon: obs_lon,
            values,
        };

        // At 00:30 the observation interpolates to base + 1; the forecast is
        // base + 10, so the bias is a constant 9.
        let result = derive_bias_grid(&forecast, &fc_lat, &fc_lon, &obs, target).unwrap();
        for &b in result.bias.iter() {
            assert!((b - 9.0).abs() < 1e-5, "bias {b}");
        }
    }

    #[test]
    fn test_relative_error_masks_near_zero() {
        let forecast = Array2::from_elem((1, 1), 2.0f32);
        let observation = Array2::from_elem((1, 1), 0.0f32);
        let out = compute_bias(
            &forecast,
            &observation,
            BiasMode::RelativeError,
            0.1,
            100.0,
        )
        .unwrap();
        assert!(out[[0, 0]].is_nan());
    }

    #[test]
    fn test_relative_error_scaling() {
        let forecast = Array2::from_elem((1, 1), 3.0f32);
        let observation = Array2::from_elem((1, 1), 2.0f32);
        let out = compute_bias(
            &forecast,
            &observation,
            BiasMode::RelativeError,
            0.1,
            100.0,
        )
        .unwrap();
        assert!((out[[0, 0]] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_align_requires_lat_lon() {
        let target = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let obs = ObservationGrid {
            time: None,
            lat: vec![],
            lon: vec![],
            values: Array3::zeros((1, 0, 0)),
        };
        let err = align_observation_to_forecast(&[0.0], &[0.0], &obs, target).unwrap_err();
        assert!(err.to_string().contains("missing required dims"));
    }

    #[test]
    fn test_time_interpolation_clamps_outside_range() {
        let mut values = Array3::zeros((2, 1, 1));
        values[[0, 0, 0]] = 1.0;
        values[[1, 0, 0]] = 3.0;
        let obs = ObservationGrid {
            time: Some(vec![
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap(),
            ]),
            lat: vec![0.0],
            lon: vec![0.0],
            values,
        };
        let before = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(interpolate_observation_time(&obs, before).unwrap()[[0, 0]], 1.0);
        assert_eq!(interpolate_observation_time(&obs, after).unwrap()[[0, 0]], 3.0);
    }
}
