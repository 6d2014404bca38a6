//! Web-Mercator (EPSG:3857) tile index math
//!
//! Standard spherical mercator: `n = 2^z` tiles per axis, latitude clamped
//! to the projection limit before conversion.

use std::f64::consts::PI;

use crate::rect::GeoRect;

/// Latitude limit of the Web-Mercator projection in degrees.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.05112878;

/// Clamp a latitude to the Web-Mercator limit.
pub fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT)
}

/// Tile column containing `lon` at `zoom`, clamped to `[0, n-1]`.
pub fn lon_to_tile_x(lon: f64, zoom: u32) -> u32 {
    let n = 1u64 << zoom;
    let x = (((lon + 180.0) / 360.0) * n as f64).floor() as i64;
    x.clamp(0, n as i64 - 1) as u32
}

/// Tile row containing `lat` at `zoom`, counted from the north, clamped to
/// `[0, n-1]`.
pub fn lat_to_tile_y(lat: f64, zoom: u32) -> u32 {
    let n = 1u64 << zoom;
    let lat_rad = clamp_lat(lat).to_radians();
    let y = (((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n as f64).floor() as i64;
    y.clamp(0, n as i64 - 1) as u32
}

/// Longitude of the west edge of tile column `x` at `zoom`.
pub fn tile_x_to_lon(x: f64, zoom: u32) -> f64 {
    let n = (1u64 << zoom) as f64;
    x / n * 360.0 - 180.0
}

/// Latitude of the north edge of tile row `y` at `zoom`.
pub fn tile_y_to_lat(y: f64, zoom: u32) -> f64 {
    let n = (1u64 << zoom) as f64;
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Inclusive geographic bounds of tile `(zoom, x, y)`.
pub fn tile_bounds(zoom: u32, x: u32, y: u32) -> GeoRect {
    GeoRect {
        west: tile_x_to_lon(x as f64, zoom),
        south: tile_y_to_lat(y as f64 + 1.0, zoom),
        east: tile_x_to_lon(x as f64 + 1.0, zoom),
        north: tile_y_to_lat(y as f64, zoom),
    }
}
