//! Terrain tile pyramid (EPSG:4326, TMS scheme)
//!
//! Terrain tiles use a 2×1 root grid (`num_tiles_x(z) = 2^(z+1)`,
//! `num_tiles_y(z) = 2^z`) with TMS row order: row 0 is the southernmost.
//! Range semantics follow the serving convention: a rectangle whose east
//! edge lands exactly on a tile boundary does not include the tile east of
//! that boundary, while a north edge landing on a boundary does include the
//! tile north of it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rect::GeoRect;

/// Largest supported zoom level.
pub const MAX_ZOOM: u32 = 30;

/// Number of tile columns at `zoom`.
pub fn num_tiles_x(zoom: u32) -> Result<u32> {
    if zoom > MAX_ZOOM {
        return Err(Error::invalid_argument(format!(
            "invalid zoom: {zoom} (max {MAX_ZOOM})"
        )));
    }
    Ok(1u32 << (zoom + 1))
}

/// Number of tile rows at `zoom`.
pub fn num_tiles_y(zoom: u32) -> Result<u32> {
    if zoom > MAX_ZOOM {
        return Err(Error::invalid_argument(format!(
            "invalid zoom: {zoom} (max {MAX_ZOOM})"
        )));
    }
    Ok(1u32 << zoom)
}

/// A terrain tile address `(z, x, y)`, TMS row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Create a validated tile id.
    pub fn new(z: u32, x: u32, y: u32) -> Result<Self> {
        let nx = num_tiles_x(z)?;
        let ny = num_tiles_y(z)?;
        if x >= nx {
            return Err(Error::invalid_argument(format!(
                "x out of range: {x} (zoom {z} has {nx} columns)"
            )));
        }
        if y >= ny {
            return Err(Error::invalid_argument(format!(
                "y out of range: {y} (zoom {z} has {ny} rows)"
            )));
        }
        Ok(Self { z, x, y })
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Geographic bounds of a terrain tile in degrees.
pub fn tile_bounds_deg(tile: TileId) -> Result<GeoRect> {
    let nx = num_tiles_x(tile.z)? as f64;
    let ny = num_tiles_y(tile.z)? as f64;
    Ok(GeoRect {
        west: -180.0 + (tile.x as f64 / nx) * 360.0,
        south: -90.0 + (tile.y as f64 / ny) * 180.0,
        east: -180.0 + ((tile.x as f64 + 1.0) / nx) * 360.0,
        north: -90.0 + ((tile.y as f64 + 1.0) / ny) * 180.0,
    })
}

/// An inclusive range of tile indices at a single zoom level.
///
/// Serializes with the field names expected by the `layer.json` `available`
/// array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    #[serde(rename = "startX")]
    pub start_x: u32,
    #[serde(rename = "startY")]
    pub start_y: u32,
    #[serde(rename = "endX")]
    pub end_x: u32,
    #[serde(rename = "endY")]
    pub end_y: u32,
}

impl TileRange {
    /// Number of tiles covered by this range.
    pub fn len(&self) -> u64 {
        (self.end_x as u64 - self.start_x as u64 + 1) * (self.end_y as u64 - self.start_y as u64 + 1)
    }

    /// Whether the range is empty (never true for a constructed range).
    pub fn is_empty(&self) -> bool {
        self.end_x < self.start_x || self.end_y < self.start_y
    }
}

/// Tile indices covering `rect` at `zoom`.
///
/// The east boundary is exclusive and the north boundary inclusive: an east
/// edge exactly on a tile seam stops at the seam, a north edge on a seam
/// extends one row past it.
pub fn tile_range_for_rectangle(rect: &GeoRect, zoom: u32) -> Result<TileRange> {
    let nx = num_tiles_x(zoom)? as i64;
    let ny = num_tiles_y(zoom)? as i64;
    let nx_f = nx as f64;
    let ny_f = ny as f64;

    let start_x = (((rect.west + 180.0) / 360.0) * nx_f).floor() as i64;
    let start_x = start_x.clamp(0, nx - 1);
    let end_x = (((rect.east + 180.0) / 360.0) * nx_f).ceil() as i64 - 1;
    let end_x = end_x.clamp(start_x, nx - 1);

    let start_y = (((rect.south + 90.0) / 180.0) * ny_f).floor() as i64;
    let start_y = start_y.clamp(0, ny - 1);
    let end_y = (((rect.north + 90.0) / 180.0) * ny_f).floor() as i64;
    let end_y = end_y.clamp(start_y, ny - 1);

    Ok(TileRange {
        start_x: start_x as u32,
        start_y: start_y as u32,
        end_x: end_x as u32,
        end_y: end_y as u32,
    })
}

/// Tiles covering `rect` at a single zoom, x-major then y.
pub fn tiles_for_rectangle(rect: &GeoRect, zoom: u32) -> Result<impl Iterator<Item = TileId>> {
    let range = tile_range_for_rectangle(rect, zoom)?;
    Ok((range.start_x..=range.end_x).flat_map(move |x| {
        (range.start_y..=range.end_y).map(move |y| TileId { z: zoom, x, y })
    }))
}

/// Tiles covering `rect` across `[min_zoom, max_zoom]`, yielded lazily
/// zoom by zoom.
pub fn iter_tile_pyramid(
    rect: &GeoRect,
    min_zoom: u32,
    max_zoom: u32,
) -> Result<impl Iterator<Item = TileId>> {
    if max_zoom > MAX_ZOOM {
        return Err(Error::invalid_argument(format!(
            "invalid zoom: {max_zoom} (max {MAX_ZOOM})"
        )));
    }
    if min_zoom > max_zoom {
        return Err(Error::invalid_argument(format!(
            "expected min_zoom <= max_zoom, got {min_zoom} > {max_zoom}"
        )));
    }
    // Ranges are cheap to compute; resolve them up-front so iteration is
    // infallible.
    let ranges: Vec<(u32, TileRange)> = (min_zoom..=max_zoom)
        .map(|z| tile_range_for_rectangle(rect, z).map(|r| (z, r)))
        .collect::<Result<_>>()?;
    Ok(ranges.into_iter().flat_map(|(z, range)| {
        (range.start_x..=range.end_x)
            .flat_map(move |x| (range.start_y..=range.end_y).map(move |y| TileId { z, x, y }))
    }))
}

/// Expand explicit ranges at `zoom` into tile ids, x-major then y.
pub fn iter_tiles_in_ranges(
    ranges: &[TileRange],
    zoom: u32,
) -> impl Iterator<Item = TileId> + '_ {
    ranges.iter().flat_map(move |range| {
        (range.start_x..=range.end_x)
            .flat_map(move |x| (range.start_y..=range.end_y).map(move |y| TileId { z: zoom, x, y }))
    })
}

/// Per-zoom `available` ranges for a `layer.json` descriptor.
///
/// The returned vector is indexed by zoom from 0 through `max_zoom`; zoom
/// levels below `min_zoom` carry an empty list.
pub fn available_ranges(
    rect: &GeoRect,
    min_zoom: u32,
    max_zoom: u32,
) -> Result<Vec<Vec<TileRange>>> {
    if max_zoom > MAX_ZOOM {
        return Err(Error::invalid_argument(format!(
            "invalid zoom: {max_zoom} (max {MAX_ZOOM})"
        )));
    }
    if min_zoom > max_zoom {
        return Err(Error::invalid_argument(format!(
            "expected min_zoom <= max_zoom, got {min_zoom} > {max_zoom}"
        )));
    }
    let mut out = Vec::with_capacity(max_zoom as usize + 1);
    for z in 0..=max_zoom {
        if z < min_zoom {
            out.push(Vec::new());
        } else {
            out.push(vec![tile_range_for_rectangle(rect, z)?]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_tiles() {
        assert_eq!(num_tiles_x(0).unwrap(), 2);
        assert_eq!(num_tiles_y(0).unwrap(), 1);
        assert_eq!(num_tiles_x(1).unwrap(), 4);
        assert_eq!(num_tiles_y(1).unwrap(), 2);
        assert!(num_tiles_x(31).is_err());
        assert!(num_tiles_y(31).is_err());
    }

    #[test]
    fn test_tile_bounds_deg() {
        let b = tile_bounds_deg(TileId { z: 0, x: 0, y: 0 }).unwrap();
        assert_eq!(b, GeoRect { west: -180.0, south: -90.0, east: 0.0, north: 90.0 });

        let b = tile_bounds_deg(TileId { z: 0, x: 1, y: 0 }).unwrap();
        assert_eq!(b, GeoRect { west: 0.0, south: -90.0, east: 180.0, north: 90.0 });

        let b = tile_bounds_deg(TileId { z: 1, x: 3, y: 1 }).unwrap();
        assert_eq!(b, GeoRect { west: 90.0, south: 0.0, east: 180.0, north: 90.0 });
    }

    #[test]
    fn test_tile_id_validation() {
        assert!(TileId::new(0, 0, 0).is_ok());
        assert!(TileId::new(0, 2, 0).is_err());
        assert!(TileId::new(0, 0, 1).is_err());
        assert!(TileId::new(31, 0, 0).is_err());
    }

    #[test]
    fn test_tile_range_exclusive_east() {
        let rect = GeoRect::new(0.0, 0.0, 90.0, 90.0).unwrap();
        let range = tile_range_for_rectangle(&rect, 1).unwrap();
        assert_eq!(
            range,
            TileRange { start_x: 2, start_y: 1, end_x: 2, end_y: 1 }
        );
    }

    #[test]
    fn test_tiles_for_rectangle_single_zoom() {
        let rect = GeoRect::new(116.0, 39.0, 117.0, 40.0).unwrap();
        let tiles: Vec<TileId> = tiles_for_rectangle(&rect, 1).unwrap().collect();
        assert_eq!(tiles, vec![TileId { z: 1, x: 3, y: 1 }]);
    }

    #[test]
    fn test_iter_tile_pyramid_counts() {
        let rect = GeoRect::new(116.0, 39.0, 117.0, 40.0).unwrap();
        let tiles: Vec<TileId> = iter_tile_pyramid(&rect, 0, 2).unwrap().collect();
        assert_eq!(tiles[0], TileId { z: 0, x: 1, y: 0 });
        assert!(tiles.contains(&TileId { z: 1, x: 3, y: 1 }));
        assert!(tiles.contains(&TileId { z: 2, x: 6, y: 2 }));
    }

    #[test]
    fn test_available_ranges_structure() {
        let rect = GeoRect::new(0.0, 0.0, 90.0, 90.0).unwrap();
        let avail = available_ranges(&rect, 0, 1).unwrap();
        assert_eq!(avail.len(), 2);
        assert_eq!(
            avail[0],
            vec![TileRange { start_x: 1, start_y: 0, end_x: 1, end_y: 0 }]
        );
        assert_eq!(
            avail[1],
            vec![TileRange { start_x: 2, start_y: 1, end_x: 2, end_y: 1 }]
        );

        let avail = available_ranges(&rect, 1, 1).unwrap();
        assert!(avail[0].is_empty());
        assert_eq!(
            avail[1],
            vec![TileRange { start_x: 2, start_y: 1, end_x: 2, end_y: 1 }]
        );
    }

    #[test]
    fn test_available_ranges_serialize_field_names() {
        let range = TileRange { start_x: 2, start_y: 1, end_x: 2, end_y: 1 };
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"startX": 2, "startY": 1, "endX": 2, "endY": 1})
        );
    }

    #[test]
    fn test_zoom_validation() {
        let rect = GeoRect::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(iter_tile_pyramid(&rect, 2, 1).is_err());
        assert!(available_ranges(&rect, 2, 1).is_err());
        assert!(iter_tile_pyramid(&rect, 0, 31).is_err());
    }

    #[test]
    fn test_iter_tiles_in_ranges_order() {
        let ranges = [TileRange { start_x: 1, start_y: 3, end_x: 2, end_y: 4 }];
        let tiles: Vec<TileId> = iter_tiles_in_ranges(&ranges, 5).collect();
        assert_eq!(
            tiles,
            vec![
                TileId { z: 5, x: 1, y: 3 },
                TileId { z: 5, x: 1, y: 4 },
                TileId { z: 5, x: 2, y: 3 },
                TileId { z: 5, x: 2, y: 4 },
            ]
        );
    }

    #[test]
    fn test_world_rect_covers_all_tiles() {
        let rect = GeoRect::world();
        let range = tile_range_for_rectangle(&rect, 1).unwrap();
        assert_eq!(
            range,
            TileRange { start_x: 0, start_y: 0, end_x: 3, end_y: 1 }
        );
        assert_eq!(range.len(), 8);
    }
}
