//! Percentile estimation: exact (short windows) and P² on-line (long ones)

use ndarray::{ArrayD, IxDyn};

use crate::accumulator::PercentileField;
use crate::error::{Error, Result};

/// Validate that every percentile lies strictly inside (0, 100).
pub fn validate_percentiles(percentiles: &[f64]) -> Result<()> {
    for &p in percentiles {
        if !p.is_finite() || p <= 0.0 || p >= 100.0 {
            return Err(Error::invalid_argument(format!(
                "percentiles must be in (0, 100), got {p}"
            )));
        }
    }
    Ok(())
}

/// Exact per-cell percentiles over a full sample stack.
///
/// NaN cells are excluded; a cell with no finite samples reports NaN. Uses
/// linear interpolation between order statistics (rank `p/100 * (n-1)`).
pub fn exact_percentiles(
    samples: &[ArrayD<f32>],
    percentiles: &[f64],
) -> Result<Vec<PercentileField>> {
    validate_percentiles(percentiles)?;

    if samples.is_empty() {
        return Ok(percentiles
            .iter()
            .map(|&p| PercentileField {
                percentile: p,
                values: ArrayD::zeros(IxDyn(&[0])),
            })
            .collect());
    }

    let shape = samples[0].shape().to_vec();
    for sample in samples {
        if sample.shape() != shape.as_slice() {
            return Err(Error::invalid_argument(format!(
                "sample shape mismatch: expected {:?}, got {:?}",
                shape,
                sample.shape()
            )));
        }
    }

    let n_cells = shape.iter().product::<usize>();
    // Logical-order copies keep the per-cell walk independent of each
    // sample's memory layout.
    let flat: Vec<Vec<f32>> = samples.iter().map(|s| s.iter().copied().collect()).collect();

    let mut out: Vec<Vec<f32>> = percentiles.iter().map(|_| vec![0.0; n_cells]).collect();

    let mut cell_values: Vec<f32> = Vec::with_capacity(samples.len());
    for cell in 0..n_cells {
        cell_values.clear();
        for sample in &flat {
            let v = sample[cell];
            if v.is_finite() {
                cell_values.push(v);
            }
        }
        cell_values.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));

        for (field, &p) in out.iter_mut().zip(percentiles) {
            field[cell] = interpolate_sorted(&cell_values, p);
        }
    }

    percentiles
        .iter()
        .zip(out)
        .map(|(&p, values)| {
            let values = ArrayD::from_shape_vec(IxDyn(&shape), values)
                .map_err(|e| Error::invalid_argument(format!("bad sample shape: {e}")))?;
            Ok(PercentileField {
                percentile: p,
                values,
            })
        })
        .collect()
}

fn interpolate_sorted(sorted: &[f32], percentile: f64) -> f32 {
    match sorted.len() {
        0 => f32::NAN,
        1 => sorted[0],
        n => {
            let rank = percentile / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = (rank - lo as f64) as f32;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// The P² on-line percentile estimator for a single cell.
///
/// Five markers (value, actual position, desired position) track the
/// percentile without retaining samples. The first five observations
/// initialize the markers; until then the estimate is NaN.
#[derive(Debug, Clone)]
pub struct P2Quantile {
    /// Percentile as a fraction in (0, 1).
    p: f64,
    count: u64,
    initial: [f64; 5],
    q: [f64; 5],
    n: [f64; 5],
    np: [f64; 5],
    dn: [f64; 5],
}

impl P2Quantile {
    /// Create an estimator for `percentile` ∈ (0, 100).
    pub fn new(percentile: f64) -> Result<Self> {
        validate_percentiles(&[percentile])?;
        let p = percentile / 100.0;
        Ok(Self {
            p,
            count: 0,
            initial: [0.0; 5],
            q: [0.0; 5],
            n: [0.0, 1.0, 2.0, 3.0, 4.0],
            np: [0.0, 2.0 * p, 4.0 * p, 2.0 + 2.0 * p, 4.0],
            dn: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
        })
    }

    /// Number of samples observed (NaN samples are not counted).
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Feed one sample. NaN samples are skipped.
    pub fn update(&mut self, x: f64) {
        if x.is_nan() {
            return;
        }
        if self.count < 5 {
            self.initial[self.count as usize] = x;
            self.count += 1;
            if self.count == 5 {
                self.initial
                    .sort_by(|a, b| a.partial_cmp(b).expect("finite samples"));
                self.q = self.initial;
            }
            return;
        }

        // Locate the marker cell and grow the extremes.
        let k = if x < self.q[0] {
            self.q[0] = x;
            0
        } else if x >= self.q[4] {
            self.q[4] = x;
            3
        } else {
            let mut k = 0;
            for i in 1..4 {
                if x >= self.q[i] {
                    k = i;
                }
            }
            k
        };

        for i in (k + 1)..5 {
            self.n[i] += 1.0;
        }
        for i in 0..5 {
            self.np[i] += self.dn[i];
        }

        // Shift interior markers toward their desired positions.
        for i in 1..4 {
            let d = self.np[i] - self.n[i];
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1.0)
                || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1.0)
            {
                let ds = d.signum();
                let parabolic = self.parabolic(i, ds);
                if self.q[i - 1] < parabolic && parabolic < self.q[i + 1] {
                    self.q[i] = parabolic;
                } else {
                    self.q[i] = self.linear(i, ds);
                }
                self.n[i] += ds;
            }
        }
        self.count += 1;
    }

    fn parabolic(&self, i: usize, d: f64) -> f64 {
        let q = &self.q;
        let n = &self.n;
        q[i] + d / (n[i + 1] - n[i - 1])
            * ((n[i] - n[i - 1] + d) * (q[i + 1] - q[i]) / (n[i + 1] - n[i])
                + (n[i + 1] - n[i] - d) * (q[i] - q[i - 1]) / (n[i] - n[i - 1]))
    }

    fn linear(&self, i: usize, d: f64) -> f64 {
        let j = (i as f64 + d) as usize;
        self.q[i] + d * (self.q[j] - self.q[i]) / (self.n[j] - self.n[i])
    }

    /// Current estimate: the middle marker. NaN until five samples have
    /// been observed.
    pub fn estimate(&self) -> f64 {
        if self.count < 5 {
            return f64::NAN;
        }
        self.q[2]
    }

    /// The percentile this estimator tracks, in (0, 100).
    pub fn percentile(&self) -> f64 {
        self.p * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(value: f32) -> ArrayD<f32> {
        ArrayD::from_elem(IxDyn(&[2, 2]), value)
    }

    #[test]
    fn test_exact_percentiles_six_samples() {
        let samples: Vec<ArrayD<f32>> = (1..=6).map(|v| grid(v as f32)).collect();
        let out = exact_percentiles(&samples, &[10.0, 50.0, 90.0]).unwrap();
        assert_relative_eq!(out[0].values[[0, 0]], 1.5);
        assert_relative_eq!(out[1].values[[0, 0]], 3.5);
        assert_relative_eq!(out[2].values[[0, 0]], 5.5);
    }

    #[test]
    fn test_exact_percentiles_skip_nan() {
        let samples = vec![grid(1.0), grid(f32::NAN), grid(3.0)];
        let out = exact_percentiles(&samples, &[50.0]).unwrap();
        assert_relative_eq!(out[0].values[[1, 1]], 2.0);
    }

    #[test]
    fn test_exact_percentiles_all_nan_cell() {
        let samples = vec![grid(f32::NAN)];
        let out = exact_percentiles(&samples, &[50.0]).unwrap();
        assert!(out[0].values[[0, 0]].is_nan());
    }

    #[test]
    fn test_exact_percentiles_empty_samples() {
        let out = exact_percentiles(&[], &[50.0]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].values.len(), 0);
    }

    #[test]
    fn test_exact_percentiles_validation() {
        assert!(exact_percentiles(&[grid(0.0)], &[0.0]).is_err());
        assert!(exact_percentiles(&[grid(0.0)], &[100.0]).is_err());

        let mismatched = vec![grid(0.0), ArrayD::zeros(IxDyn(&[1, 2]))];
        assert!(exact_percentiles(&mismatched, &[50.0]).is_err());
    }

    #[test]
    fn test_p2_nan_until_five_samples() {
        let mut est = P2Quantile::new(50.0).unwrap();
        for v in 1..=4 {
            est.update(v as f64);
            assert!(est.estimate().is_nan());
        }
        est.update(5.0);
        assert_relative_eq!(est.estimate(), 3.0);
    }

    #[test]
    fn test_p2_skips_nan_samples() {
        let mut est = P2Quantile::new(50.0).unwrap();
        for v in 1..=4 {
            est.update(v as f64);
            est.update(f64::NAN);
        }
        assert!(est.estimate().is_nan());
        est.update(5.0);
        assert_relative_eq!(est.estimate(), 3.0);
    }

    #[test]
    fn test_p2_reasonable_estimates_over_fifty_samples() {
        let mut p50 = P2Quantile::new(50.0).unwrap();
        let mut p90 = P2Quantile::new(90.0).unwrap();
        for v in 1..=50 {
            p50.update(v as f64);
            p90.update(v as f64);
        }
        let e50 = p50.estimate();
        let e90 = p90.estimate();
        assert!(e50 > 20.0 && e50 < 35.0, "p50 estimate {e50}");
        assert!(e90 > 40.0 && e90 <= 50.0, "p90 estimate {e90}");
    }

    #[test]
    fn test_p2_rejects_out_of_range_percentile() {
        assert!(P2Quantile::new(0.0).is_err());
        assert!(P2Quantile::new(100.0).is_err());
        assert!(P2Quantile::new(-3.0).is_err());
    }
}
