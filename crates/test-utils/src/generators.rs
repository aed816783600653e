//! Synthetic elevation rasters in HGT layout.
//!
//! HGT files are square grids of big-endian `i16` samples in metres, row 0
//! at the north edge. The generators here build small grids with known
//! contour crossings so extraction results can be asserted exactly.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Creates a cone-shaped hill centred in a `size`×`size` grid.
///
/// Elevation falls linearly from `peak` at the centre to `base` at a radius of
/// half the grid side, and stays at `base` beyond it.
///
/// ```
/// use test_utils::create_hill_dem;
///
/// let dem = create_hill_dem(5, 200, 0);
/// assert_eq!(dem.len(), 25);
/// assert_eq!(dem[12], 200);
/// ```
pub fn create_hill_dem(size: usize, peak: i16, base: i16) -> Vec<i16> {
    let center = (size as f64 - 1.0) / 2.0;
    let radius = size as f64 / 2.0;
    let mut data = Vec::with_capacity(size * size);
    for row in 0..size {
        for col in 0..size {
            let dx = col as f64 - center;
            let dy = row as f64 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            let t = (1.0 - dist / radius).max(0.0);
            data.push(base + (f64::from(peak - base) * t).round() as i16);
        }
    }
    data
}

/// Creates a grid with a constant elevation.
pub fn create_flat_dem(size: usize, value: i16) -> Vec<i16> {
    vec![value; size * size]
}

/// Encode samples as raw HGT bytes (big-endian i16).
pub fn encode_hgt(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

/// Gzip a byte buffer.
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(bytes)
        .expect("Failed to write to gzip encoder");
    encoder.finish().expect("Failed to finish gzip stream")
}

/// A gzipped HGT archive holding a hill.
pub fn hill_hgt_gz(size: usize, peak: i16, base: i16) -> Vec<u8> {
    gzip(&encode_hgt(&create_hill_dem(size, peak, base)))
}

/// A gzipped HGT archive holding a flat plain.
pub fn flat_hgt_gz(size: usize, value: i16) -> Vec<u8> {
    gzip(&encode_hgt(&create_flat_dem(size, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hill_shape() {
        let dem = create_hill_dem(11, 300, 0);
        assert_eq!(dem[5 * 11 + 5], 300);
        assert_eq!(dem[0], 0);
        assert!(dem[5 * 11 + 3] < 300);
        assert!(dem[5 * 11 + 3] > 0);
    }

    #[test]
    fn test_encode_hgt_big_endian() {
        let bytes = encode_hgt(&[1, -1, 256]);
        assert_eq!(bytes, vec![0x00, 0x01, 0xFF, 0xFF, 0x01, 0x00]);
    }
}
