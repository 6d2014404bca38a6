//! Wind speed and direction from vector components

use crate::cube::Variable;
use crate::error::{Error, Result};

fn check_aligned(u: &Variable, v: &Variable) -> Result<()> {
    if u.data.shape() != v.data.shape() {
        return Err(Error::invalid_argument(format!(
            "u and v must share identical grids, got {:?} and {:?}",
            u.data.shape(),
            v.data.shape()
        )));
    }
    Ok(())
}

/// Wind speed `sqrt(u² + v²)`.
///
/// The units attribute is inherited when `u` and `v` agree on one.
pub fn derive_wind_speed(u: &Variable, v: &Variable) -> Result<Variable> {
    check_aligned(u, v)?;
    let mut data = u.data.clone();
    data.zip_mut_with(&v.data, |a, &b| *a = a.hypot(b));

    let units = match (&u.units, &v.units) {
        (Some(a), Some(b)) if !a.trim().is_empty() && a.trim() == b.trim() => {
            Some(a.trim().to_string())
        }
        _ => None,
    };

    Ok(Variable {
        data,
        units,
        long_name: Some("Wind speed".to_string()),
    })
}

/// Wind direction as a bearing from North, clockwise, in [0, 360).
///
/// 0° means the wind blows toward North (`u = 0, v > 0`), 90° toward East
/// (`u > 0, v = 0`): `degrees(atan2(u, v))` wrapped into [0, 360).
pub fn derive_wind_dir(u: &Variable, v: &Variable) -> Result<Variable> {
    check_aligned(u, v)?;
    let mut data = u.data.clone();
    data.zip_mut_with(&v.data, |a, &b| {
        *a = a.atan2(b).to_degrees().rem_euclid(360.0);
    });

    Ok(Variable {
        data,
        units: Some("degree".to_string()),
        long_name: Some("Wind direction".to_string()),
    })
}
