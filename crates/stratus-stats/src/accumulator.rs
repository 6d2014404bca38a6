//! Streaming per-cell statistics over a fixed grid shape
//!
//! The accumulator holds count/sum/min/max per cell plus one P² estimator
//! per cell per requested percentile, so memory stays flat regardless of
//! how many samples stream through. Updates are not thread-safe; callers
//! funnel samples per accumulator.

use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};
use crate::percentile::{validate_percentiles, P2Quantile};

/// One percentile surface from a finalized accumulator.
#[derive(Debug, Clone)]
pub struct PercentileField {
    pub percentile: f64,
    pub values: ArrayD<f32>,
}

/// Finalized statistics over everything streamed so far.
#[derive(Debug, Clone)]
pub struct GridStatistics {
    pub count: ArrayD<u64>,
    pub sum: ArrayD<f64>,
    /// `sum / count`; NaN where `count == 0`.
    pub mean: ArrayD<f32>,
    pub min: ArrayD<f32>,
    pub max: ArrayD<f32>,
    pub percentiles: Vec<PercentileField>,
}

impl GridStatistics {
    /// Look up a percentile surface.
    pub fn percentile(&self, p: f64) -> Option<&ArrayD<f32>> {
        self.percentiles
            .iter()
            .find(|field| field.percentile == p)
            .map(|field| &field.values)
    }
}

/// Streaming statistics accumulator over a fixed shape.
pub struct GridStatsAccumulator {
    shape: Vec<usize>,
    count: Vec<u64>,
    sum: Vec<f64>,
    min: Vec<f32>,
    max: Vec<f32>,
    /// Per percentile, one estimator per cell.
    percentiles: Vec<(f64, Vec<P2Quantile>)>,
}

impl GridStatsAccumulator {
    /// Create an accumulator for samples of `shape`, tracking the given
    /// percentiles (each in (0, 100)).
    pub fn new(shape: &[usize], percentiles: &[f64]) -> Result<Self> {
        if shape.is_empty() {
            return Err(Error::invalid_argument("shape must not be empty"));
        }
        validate_percentiles(percentiles)?;
        let n_cells = shape.iter().product::<usize>();

        let mut estimators = Vec::with_capacity(percentiles.len());
        for &p in percentiles {
            let mut cells = Vec::with_capacity(n_cells);
            for _ in 0..n_cells {
                cells.push(P2Quantile::new(p)?);
            }
            estimators.push((p, cells));
        }

        Ok(Self {
            shape: shape.to_vec(),
            count: vec![0; n_cells],
            sum: vec![0.0; n_cells],
            min: vec![f32::INFINITY; n_cells],
            max: vec![f32::NEG_INFINITY; n_cells],
            percentiles: estimators,
        })
    }

    /// Grid shape this accumulator expects.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Stream one sample. NaN cells are excluded from every statistic.
    pub fn update(&mut self, sample: &ArrayD<f32>) -> Result<()> {
        if sample.shape() != self.shape.as_slice() {
            return Err(Error::invalid_argument(format!(
                "sample shape mismatch: expected {:?}, got {:?}",
                self.shape,
                sample.shape()
            )));
        }

        for (cell, &v) in sample.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            self.count[cell] += 1;
            self.sum[cell] += v as f64;
            if v < self.min[cell] {
                self.min[cell] = v;
            }
            if v > self.max[cell] {
                self.max[cell] = v;
            }
            for (_, cells) in &mut self.percentiles {
                cells[cell].update(v as f64);
            }
        }
        Ok(())
    }

    /// Snapshot the statistics accumulated so far.
    pub fn finalize(&self) -> GridStatistics {
        let n_cells = self.count.len();

        let mut mean = vec![f32::NAN; n_cells];
        let mut min = vec![f32::NAN; n_cells];
        let mut max = vec![f32::NAN; n_cells];
        for cell in 0..n_cells {
            if self.count[cell] > 0 {
                mean[cell] = (self.sum[cell] / self.count[cell] as f64) as f32;
                min[cell] = self.min[cell];
                max[cell] = self.max[cell];
            }
        }

        let percentiles = self
            .percentiles
            .iter()
            .map(|(p, cells)| {
                let values: Vec<f32> = cells.iter().map(|c| c.estimate() as f32).collect();
                PercentileField {
                    percentile: *p,
                    values: ArrayD::from_shape_vec(IxDyn(&self.shape), values)
                        .expect("shape fixed at construction"),
                }
            })
            .collect();

        let shape = IxDyn(&self.shape);
        GridStatistics {
            count: ArrayD::from_shape_vec(shape.clone(), self.count.clone())
                .expect("shape fixed at construction"),
            sum: ArrayD::from_shape_vec(shape.clone(), self.sum.clone())
                .expect("shape fixed at construction"),
            mean: ArrayD::from_shape_vec(shape.clone(), mean).expect("shape fixed at construction"),
            min: ArrayD::from_shape_vec(shape.clone(), min).expect("shape fixed at construction"),
            max: ArrayD::from_shape_vec(shape, max).expect("shape fixed at construction"),
            percentiles,
        }
    }
}
