//! Geographic rectangles in degrees

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A geographic rectangle in degrees, `west < east` and `south < north`.
///
/// Longitudes are bounded to [-180, 180] and latitudes to [-90, 90]; the
/// antimeridian is not crossed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRect {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoRect {
    /// Create a validated rectangle.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        if !west.is_finite() || !south.is_finite() || !east.is_finite() || !north.is_finite() {
            return Err(Error::invalid_argument("rectangle bounds must be finite"));
        }
        if !(-180.0..=180.0).contains(&west) {
            return Err(Error::invalid_argument(format!("west out of range: {west}")));
        }
        if !(-180.0..=180.0).contains(&east) {
            return Err(Error::invalid_argument(format!("east out of range: {east}")));
        }
        if !(-90.0..=90.0).contains(&south) {
            return Err(Error::invalid_argument(format!(
                "south out of range: {south}"
            )));
        }
        if !(-90.0..=90.0).contains(&north) {
            return Err(Error::invalid_argument(format!(
                "north out of range: {north}"
            )));
        }
        if west >= east {
            return Err(Error::invalid_argument(format!(
                "expected west < east, got west={west} east={east}"
            )));
        }
        if south >= north {
            return Err(Error::invalid_argument(format!(
                "expected south < north, got south={south} north={north}"
            )));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Whole-world rectangle.
    pub fn world() -> Self {
        Self {
            west: -180.0,
            south: -90.0,
            east: 180.0,
            north: 90.0,
        }
    }

    /// Geographic center `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Bounds as a `[west, south, east, north]` array.
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_rect() {
        let rect = GeoRect::new(116.0, 39.0, 117.0, 40.0).unwrap();
        assert_eq!(rect.center(), (116.5, 39.5));
        assert_eq!(rect.width(), 1.0);
        assert_eq!(rect.height(), 1.0);
    }

    #[test]
    fn test_world_rect() {
        let rect = GeoRect::world();
        assert_eq!(rect.to_array(), [-180.0, -90.0, 180.0, 90.0]);
    }

    #[test]
    fn test_rejects_out_of_range_west() {
        let err = GeoRect::new(-181.0, 0.0, 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("west out of range"));
    }

    #[test]
    fn test_rejects_degenerate_rect() {
        let err = GeoRect::new(1.0, 0.0, 1.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("west < east"));

        let err = GeoRect::new(0.0, 1.0, 1.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("south < north"));
    }
}
