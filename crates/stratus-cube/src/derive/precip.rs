//! Per-interval precipitation amounts from cumulative accumulations

use ndarray::Axis;

use crate::cube::Variable;
use crate::error::Result;

/// Convert accumulated precipitation to per-interval amounts by differencing
/// along the time axis.
///
/// The first timestamp has no predecessor: it is filled with
/// `accumulated[0] - initial`, or NaN when `initial` is `None`. Negative
/// differences (accumulator resets, float noise) clip to zero when
/// `clamp_negative` is set.
pub fn precipitation_amount_from_accumulation(
    accumulated: &Variable,
    initial: Option<f64>,
    clamp_negative: bool,
) -> Result<Variable> {
    let mut data = accumulated.data.clone();
    let n_time = data.len_of(Axis(0));

    if n_time > 0 {
        // Walk time backwards so each step still sees the undiffed
        // predecessor.
        for t in (1..n_time).rev() {
            let prev = data.index_axis(Axis(0), t - 1).to_owned();
            let mut cur = data.index_axis_mut(Axis(0), t);
            cur.zip_mut_with(&prev, |c, &p| *c -= p);
        }
        let mut first = data.index_axis_mut(Axis(0), 0);
        match initial {
            Some(initial) => first.mapv_inplace(|v| v - initial as f32),
            None => first.fill(f32::NAN),
        }
    }

    if clamp_negative {
        // NaN compares false and is left alone.
        data.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
    }

    Ok(Variable {
        data,
        units: accumulated.units.clone(),
        long_name: Some("precipitation amount over the previous interval".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn tp(values: &[f32]) -> Variable {
        let data = Array4::from_shape_vec((values.len(), 1, 1, 1), values.to_vec()).unwrap();
        Variable::new(data).with_units("mm")
    }

    fn amounts(var: &Variable) -> Vec<f32> {
        var.data.iter().copied().collect()
    }

    #[test]
    fn test_differencing_with_reset() {
        let out =
            precipitation_amount_from_accumulation(&tp(&[0.0, 2.0, 2.0, 5.0]), Some(0.0), true)
                .unwrap();
        assert_eq!(amounts(&out), vec![0.0, 2.0, 0.0, 3.0]);
        assert_eq!(out.units.as_deref(), Some("mm"));
    }

    #[test]
    fn test_negative_differences_clamp_to_zero() {
        let out =
            precipitation_amount_from_accumulation(&tp(&[5.0, 3.0, 4.0]), Some(0.0), true).unwrap();
        assert_eq!(amounts(&out), vec![5.0, 0.0, 1.0]);
    }

    #[test]
    fn test_negative_differences_kept_when_unclamped() {
        let out = precipitation_amount_from_accumulation(&tp(&[5.0, 3.0]), Some(0.0), false)
            .unwrap();
        assert_eq!(amounts(&out), vec![5.0, -2.0]);
    }

    #[test]
    fn test_initial_none_leaves_first_nan() {
        let out = precipitation_amount_from_accumulation(&tp(&[1.0, 4.0]), None, true).unwrap();
        let values = amounts(&out);
        assert!(values[0].is_nan());
        assert_eq!(values[1], 3.0);
    }

    #[test]
    fn test_nonzero_initial() {
        let out = precipitation_amount_from_accumulation(&tp(&[2.0, 3.0]), Some(0.5), true)
            .unwrap();
        assert_eq!(amounts(&out), vec![1.5, 1.0]);
    }

    #[test]
    fn test_nan_cells_propagate() {
        let out =
            precipitation_amount_from_accumulation(&tp(&[0.0, f32::NAN, 5.0]), Some(0.0), true)
                .unwrap();
        let values = amounts(&out);
        assert_eq!(values[0], 0.0);
        assert!(values[1].is_nan());
        assert!(values[2].is_nan());
    }
}
