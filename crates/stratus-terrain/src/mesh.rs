//! Quantized-mesh terrain tile encoding
//!
//! Payload layout (all little-endian):
//!
//! 1. 88-byte header: ECEF center (3×f64), min/max height (2×f32),
//!    bounding sphere center+radius (4×f64), horizon occlusion point
//!    (3×f64)
//! 2. u32 vertex count, then three u16 streams (`u`, `v`, `height`)
//!    encoded as delta + zig-zag
//! 3. one zero pad byte when needed so the index block is 16-bit aligned
//! 4. u32 triangle count, then `3 × count` u16 high-water-mark codes
//! 5. four edge lists (west, south, east, north): u32 count + u16 indices
//!
//! The whole payload may be gzip-wrapped for serving.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use stratus_core::GeoRect;

use crate::error::{Error, Result};

/// WGS-84 semi-major axis in meters.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS-84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

const QUANT_MAX: f64 = 32767.0;
const HEIGHT_EPSILON: f64 = 1e-6;
/// u16 triangle indices limit the grid edge to 256 samples.
const MAX_GRID_SIZE: usize = 256;

/// A square height grid in meters, row-major with row 0 at the north edge.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    size: usize,
    values: Vec<f32>,
}

impl HeightGrid {
    /// Create a grid from row-major values; `values.len()` must equal
    /// `size * size` and `size` must be at least 2.
    pub fn new(size: usize, values: Vec<f32>) -> Result<Self> {
        if size < 2 {
            return Err(Error::invalid_argument(format!(
                "grid size must be >= 2, got {size}"
            )));
        }
        if size > MAX_GRID_SIZE {
            return Err(Error::invalid_argument(format!(
                "grid size must be <= {MAX_GRID_SIZE}, got {size}"
            )));
        }
        if values.len() != size * size {
            return Err(Error::invalid_argument(format!(
                "grid is not square: expected {} values, got {}",
                size * size,
                values.len()
            )));
        }
        Ok(Self { size, values })
    }

    /// Flat grid at a constant height.
    pub fn constant(size: usize, height: f32) -> Result<Self> {
        Self::new(size, vec![height; size * size])
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.size + col]
    }

    fn min_max(&self) -> Result<(f32, f32)> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &self.values {
            if !v.is_finite() {
                return Err(Error::invalid_argument(
                    "height grid contains non-finite values",
                ));
            }
            min = min.min(v);
            max = max.max(v);
        }
        Ok((min, max))
    }
}

/// Options for [`encode_quantized_mesh`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantizedMeshOptions {
    /// Gzip-wrap the payload (served artifacts start with `1F 8B`).
    pub gzip: bool,
}

/// Zig-zag encode a signed delta so small magnitudes become small codes.
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
pub fn zigzag_decode(code: u32) -> i32 {
    ((code >> 1) as i32) ^ -((code & 1) as i32)
}

/// Delta + zig-zag encode a u16 stream.
pub fn delta_zigzag_encode(values: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev = 0i32;
    for &v in values {
        let delta = v as i32 - prev;
        out.push(zigzag_encode(delta) as u16);
        prev = v as i32;
    }
    out
}

/// Inverse of [`delta_zigzag_encode`].
pub fn delta_zigzag_decode(codes: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(codes.len());
    let mut acc = 0i32;
    for &c in codes {
        acc += zigzag_decode(c as u32);
        out.push(acc as u16);
    }
    out
}

/// High-water-mark encode a triangle index stream. Each index `i` is
/// emitted as `hwm - i`; the mark advances past each index on its first
/// appearance, so new indices must arrive in sequential order.
pub fn high_water_mark_encode(indices: &[u32]) -> Result<Vec<u16>> {
    let mut out = Vec::with_capacity(indices.len());
    let mut hwm = 0u32;
    for &i in indices {
        if i > hwm {
            return Err(Error::encode(format!(
                "index {i} skips the high-water mark {hwm}"
            )));
        }
        let code = hwm - i;
        if code > u16::MAX as u32 {
            return Err(Error::encode(format!(
                "high-water code {code} exceeds 16 bits"
            )));
        }
        out.push(code as u16);
        if i == hwm {
            hwm += 1;
        }
    }
    Ok(out)
}

/// Inverse of [`high_water_mark_encode`]. Codes larger than the current
/// mark cannot come from a valid encoder and clamp to index 0.
pub fn high_water_mark_decode(codes: &[u16]) -> Vec<u32> {
    let mut out = Vec::with_capacity(codes.len());
    let mut hwm = 0u32;
    for &c in codes {
        out.push(hwm.saturating_sub(c as u32));
        if c == 0 {
            hwm += 1;
        }
    }
    out
}

/// Geodetic (lon, lat in degrees, height in meters) to ECEF on the WGS-84
/// ellipsoid.
pub fn wgs84_to_ecef(lon_deg: f64, lat_deg: f64, height_m: f64) -> (f64, f64, f64) {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let x = (n + height_m) * lat.cos() * lon.cos();
    let y = (n + height_m) * lat.cos() * lon.sin();
    let z = (n * (1.0 - e2) + height_m) * lat.sin();
    (x, y, z)
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f32(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Grid triangles split along the top-left → bottom-right diagonal, with
/// vertices renumbered in first-use order so the index stream satisfies the
/// high-water-mark rule.
fn triangulate(size: usize) -> (Vec<u32>, Vec<usize>) {
    let mut indices: Vec<usize> = Vec::with_capacity(6 * (size - 1) * (size - 1));
    for row in 0..size - 1 {
        for col in 0..size - 1 {
            let tl = row * size + col;
            let tr = tl + 1;
            let bl = tl + size;
            let br = bl + 1;
            indices.extend_from_slice(&[tl, bl, br]);
            indices.extend_from_slice(&[tl, br, tr]);
        }
    }

    let mut remap: Vec<Option<u32>> = vec![None; size * size];
    let mut vertex_order: Vec<usize> = Vec::with_capacity(size * size);
    let mut remapped: Vec<u32> = Vec::with_capacity(indices.len());
    for grid_index in indices {
        let new_index = match remap[grid_index] {
            Some(idx) => idx,
            None => {
                let idx = vertex_order.len() as u32;
                remap[grid_index] = Some(idx);
                vertex_order.push(grid_index);
                idx
            }
        };
        remapped.push(new_index);
    }
    (remapped, vertex_order)
}

/// Encode a height grid over `rect` as a quantized-mesh terrain tile.
pub fn encode_quantized_mesh(
    rect: &GeoRect,
    heights: &HeightGrid,
    options: &QuantizedMeshOptions,
) -> Result<Vec<u8>> {
    let size = heights.size();
    let (min_h, max_h) = heights.min_max()?;
    let height_span = ((max_h - min_h) as f64).max(HEIGHT_EPSILON);

    let (center_lon, center_lat) = rect.center();
    let center = wgs84_to_ecef(center_lon, center_lat, (min_h as f64 + max_h as f64) / 2.0);

    // Bounding sphere over the ECEF sample set.
    let step = 1.0 / (size - 1) as f64;
    let mut ecef: Vec<(f64, f64, f64)> = Vec::with_capacity(size * size);
    for row in 0..size {
        let lat = rect.north - rect.height() * (row as f64 * step);
        for col in 0..size {
            let lon = rect.west + rect.width() * (col as f64 * step);
            ecef.push(wgs84_to_ecef(lon, lat, heights.get(row, col) as f64));
        }
    }
    let n = ecef.len() as f64;
    let bs_center = ecef.iter().fold((0.0, 0.0, 0.0), |acc, p| {
        (acc.0 + p.0 / n, acc.1 + p.1 / n, acc.2 + p.2 / n)
    });
    let bs_radius = ecef
        .iter()
        .map(|p| {
            let (dx, dy, dz) = (p.0 - bs_center.0, p.1 - bs_center.1, p.2 - bs_center.2);
            (dx * dx + dy * dy + dz * dz).sqrt()
        })
        .fold(0.0f64, f64::max);

    // Conservative horizon occlusion point along the center direction.
    let bs_norm = (bs_center.0 * bs_center.0 + bs_center.1 * bs_center.1
        + bs_center.2 * bs_center.2)
        .sqrt();
    let hop_scale = if bs_norm > 0.0 {
        (bs_norm + bs_radius) / bs_norm
    } else {
        1.0
    };
    let horizon = (
        bs_center.0 * hop_scale,
        bs_center.1 * hop_scale,
        bs_center.2 * hop_scale,
    );

    // Quantized vertex attributes in grid order.
    let mut grid_u: Vec<u16> = Vec::with_capacity(size * size);
    let mut grid_v: Vec<u16> = Vec::with_capacity(size * size);
    let mut grid_h: Vec<u16> = Vec::with_capacity(size * size);
    for row in 0..size {
        // Row 0 sits on the north edge, so v runs from 32767 down to 0.
        let v = ((1.0 - row as f64 * step) * QUANT_MAX).round() as u16;
        for col in 0..size {
            let u = (col as f64 * step * QUANT_MAX).round() as u16;
            let h = (((heights.get(row, col) - min_h) as f64 / height_span) * QUANT_MAX)
                .round()
                .clamp(0.0, QUANT_MAX) as u16;
            grid_u.push(u);
            grid_v.push(v);
            grid_h.push(h);
        }
    }

    let (triangle_indices, vertex_order) = triangulate(size);
    let vertex_count = vertex_order.len() as u32;
    let u_stream: Vec<u16> = vertex_order.iter().map(|&g| grid_u[g]).collect();
    let v_stream: Vec<u16> = vertex_order.iter().map(|&g| grid_v[g]).collect();
    let h_stream: Vec<u16> = vertex_order.iter().map(|&g| grid_h[g]).collect();

    let remap_grid = |grid_index: usize| -> u16 {
        triangle_remap_lookup(&vertex_order, grid_index)
    };

    let mut payload = Vec::with_capacity(88 + 8 * size * size);

    // Header.
    put_f64(&mut payload, center.0);
    put_f64(&mut payload, center.1);
    put_f64(&mut payload, center.2);
    put_f32(&mut payload, min_h);
    put_f32(&mut payload, max_h);
    put_f64(&mut payload, bs_center.0);
    put_f64(&mut payload, bs_center.1);
    put_f64(&mut payload, bs_center.2);
    put_f64(&mut payload, bs_radius);
    put_f64(&mut payload, horizon.0);
    put_f64(&mut payload, horizon.1);
    put_f64(&mut payload, horizon.2);
    debug_assert_eq!(payload.len(), 88);

    // Vertex block.
    put_u32(&mut payload, vertex_count);
    for stream in [&u_stream, &v_stream, &h_stream] {
        for code in delta_zigzag_encode(stream) {
            put_u16(&mut payload, code);
        }
    }

    // Align the index block.
    if payload.len() % 2 != 0 {
        payload.push(0);
    }

    // Triangle block.
    let triangle_count = (triangle_indices.len() / 3) as u32;
    put_u32(&mut payload, triangle_count);
    for code in high_water_mark_encode(&triangle_indices)? {
        put_u16(&mut payload, code);
    }

    // Edge lists: west, south, east, north in grid row-major order.
    let west: Vec<u16> = (0..size).map(|row| remap_grid(row * size)).collect();
    let south: Vec<u16> = (0..size).map(|col| remap_grid((size - 1) * size + col)).collect();
    let east: Vec<u16> = (0..size).map(|row| remap_grid(row * size + size - 1)).collect();
    let north: Vec<u16> = (0..size).map(|col| remap_grid(col)).collect();
    for edge in [&west, &south, &east, &north] {
        put_u32(&mut payload, edge.len() as u32);
        for &index in edge.iter() {
            put_u16(&mut payload, index);
        }
    }

    if options.gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&payload)
            .map_err(|e| Error::encode(format!("gzip failed: {e}")))?;
        return encoder
            .finish()
            .map_err(|e| Error::encode(format!("gzip failed: {e}")));
    }
    Ok(payload)
}

fn triangle_remap_lookup(vertex_order: &[usize], grid_index: usize) -> u16 {
    vertex_order
        .iter()
        .position(|&g| g == grid_index)
        .expect("every grid vertex is referenced by a triangle") as u16
}

/// A decoded quantized-mesh payload (header plus streams), as used by
/// consumers and the round-trip tests.
#[derive(Debug, Clone)]
pub struct DecodedMesh {
    pub min_height: f32,
    pub max_height: f32,
    pub vertex_count: u32,
    pub u: Vec<u16>,
    pub v: Vec<u16>,
    pub h: Vec<u16>,
    pub triangle_indices: Vec<u32>,
    /// West, south, east, north.
    pub edges: [Vec<u16>; 4],
}

/// Decode an (uncompressed) quantized-mesh payload.
pub fn decode_quantized_mesh(payload: &[u8]) -> Result<DecodedMesh> {
    let mut cursor = 0usize;
    let take = |cursor: &mut usize, len: usize| -> Result<std::ops::Range<usize>> {
        let start = *cursor;
        let end = start + len;
        if end > payload.len() {
            return Err(Error::encode("payload truncated"));
        }
        *cursor = end;
        Ok(start..end)
    };
    let read_u32 = |cursor: &mut usize| -> Result<u32> {
        let r = take(cursor, 4)?;
        Ok(u32::from_le_bytes(payload[r].try_into().expect("4 bytes")))
    };
    let read_u16s = |cursor: &mut usize, count: usize| -> Result<Vec<u16>> {
        let r = take(cursor, count * 2)?;
        Ok(payload[r]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes(c.try_into().expect("2 bytes")))
            .collect())
    };

    let _header = take(&mut cursor, 24)?; // ECEF center
    let min_r = take(&mut cursor, 4)?;
    let min_height = f32::from_le_bytes(payload[min_r].try_into().expect("4 bytes"));
    let max_r = take(&mut cursor, 4)?;
    let max_height = f32::from_le_bytes(payload[max_r].try_into().expect("4 bytes"));
    let _sphere_and_horizon = take(&mut cursor, 56)?;

    let vertex_count = read_u32(&mut cursor)?;
    let u = delta_zigzag_decode(&read_u16s(&mut cursor, vertex_count as usize)?);
    let v = delta_zigzag_decode(&read_u16s(&mut cursor, vertex_count as usize)?);
    let h = delta_zigzag_decode(&read_u16s(&mut cursor, vertex_count as usize)?);

    if cursor % 2 != 0 {
        let _pad = take(&mut cursor, 1)?;
    }
    let triangle_count = read_u32(&mut cursor)?;
    let codes = read_u16s(&mut cursor, triangle_count as usize * 3)?;
    let triangle_indices = high_water_mark_decode(&codes);

    let mut edges: [Vec<u16>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
    for edge in edges.iter_mut() {
        let count = read_u32(&mut cursor)?;
        *edge = read_u16s(&mut cursor, count as usize)?;
    }

    Ok(DecodedMesh {
        min_height,
        max_height,
        vertex_count,
        u,
        v,
        h,
        triangle_indices,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zigzag_roundtrip() {
        for v in [-12345, -10, -1, 0, 1, 10, 12345] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_delta_zigzag_roundtrip() {
        let values = [0u16, 1, 1, 3, 2, 10, 10, 32767, 0];
        assert_eq!(delta_zigzag_decode(&delta_zigzag_encode(&values)), values);
    }

    #[test]
    fn test_high_water_mark_roundtrip() {
        let indices = [0u32, 1, 2, 2, 1, 0, 3, 0];
        let codes = high_water_mark_encode(&indices).unwrap();
        assert_eq!(high_water_mark_decode(&codes), indices);
    }

    #[test]
    fn test_high_water_mark_rejects_skipped_index() {
        assert!(high_water_mark_encode(&[0, 2]).is_err());
    }

    #[test]
    fn test_wgs84_to_ecef_axis_points() {
        let (x, y, z) = wgs84_to_ecef(0.0, 0.0, 0.0);
        assert_relative_eq!(x, WGS84_A, epsilon = 1e-3);
        assert_relative_eq!(y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(z, 0.0, epsilon = 1e-3);

        let (x, y, z) = wgs84_to_ecef(90.0, 0.0, 0.0);
        assert_relative_eq!(x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(y, WGS84_A, epsilon = 1e-3);
        assert_relative_eq!(z, 0.0, epsilon = 1e-3);
    }

    fn rect() -> GeoRect {
        GeoRect::new(0.0, 0.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_encode_three_by_three_decodes() {
        let heights = HeightGrid::new(
            3,
            vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0],
        )
        .unwrap();
        let payload =
            encode_quantized_mesh(&rect(), &heights, &QuantizedMeshOptions::default()).unwrap();
        assert!(payload.len() > 88);

        let mesh = decode_quantized_mesh(&payload).unwrap();
        assert_relative_eq!(mesh.min_height, 0.0);
        assert_relative_eq!(mesh.max_height, 80.0);
        assert_eq!(mesh.vertex_count, 9);
        assert_eq!(mesh.triangle_indices.len(), 8 * 3);

        assert_eq!(*mesh.u.iter().min().unwrap(), 0);
        assert_eq!(*mesh.u.iter().max().unwrap(), 32767);
        assert_eq!(*mesh.v.iter().min().unwrap(), 0);
        assert_eq!(*mesh.v.iter().max().unwrap(), 32767);
        assert_eq!(*mesh.h.iter().min().unwrap(), 0);
        assert_eq!(*mesh.h.iter().max().unwrap(), 32767);

        for &i in &mesh.triangle_indices {
            assert!(i < mesh.vertex_count);
        }
        for edge in &mesh.edges {
            assert_eq!(edge.len(), 3);
            for &i in edge {
                assert!((i as u32) < mesh.vertex_count);
            }
        }
    }

    #[test]
    fn test_minimal_grid_has_two_triangles() {
        let heights = HeightGrid::constant(2, 5.0).unwrap();
        let payload =
            encode_quantized_mesh(&rect(), &heights, &QuantizedMeshOptions::default()).unwrap();
        let mesh = decode_quantized_mesh(&payload).unwrap();
        assert_eq!(mesh.vertex_count, 4);
        assert_eq!(mesh.triangle_indices.len(), 2 * 3);
        assert_relative_eq!(mesh.min_height, 5.0);
        assert_relative_eq!(mesh.max_height, 5.0);
    }

    #[test]
    fn test_gzip_magic() {
        let heights = HeightGrid::constant(2, 0.0).unwrap();
        let payload =
            encode_quantized_mesh(&rect(), &heights, &QuantizedMeshOptions { gzip: true })
                .unwrap();
        assert_eq!(&payload[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_rejects_bad_grids() {
        assert!(HeightGrid::new(1, vec![0.0]).is_err());
        assert!(HeightGrid::new(3, vec![0.0; 8]).is_err());

        let heights = HeightGrid::new(2, vec![0.0, 1.0, f32::NAN, 3.0]).unwrap();
        assert!(
            encode_quantized_mesh(&rect(), &heights, &QuantizedMeshOptions::default()).is_err()
        );
    }

    #[test]
    fn test_edge_vertices_sit_on_edges() {
        let heights = HeightGrid::constant(3, 0.0).unwrap();
        let payload =
            encode_quantized_mesh(&rect(), &heights, &QuantizedMeshOptions::default()).unwrap();
        let mesh = decode_quantized_mesh(&payload).unwrap();

        let [west, south, east, north] = &mesh.edges;
        for &i in west {
            assert_eq!(mesh.u[i as usize], 0);
        }
        for &i in east {
            assert_eq!(mesh.u[i as usize], 32767);
        }
        for &i in south {
            assert_eq!(mesh.v[i as usize], 0);
        }
        for &i in north {
            assert_eq!(mesh.v[i as usize], 32767);
        }
    }
}
