//! SRTM HGT raster decoding.
//!
//! An HGT file is a square grid of big-endian `i16` elevations in metres,
//! rows ordered north to south. Edges overlap with the neighbouring cells,
//! so a 1° cell at 1 arc-second is 3601×3601 samples. `-32768` marks voids.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::{ContourError, ContourResult};

/// Sample value marking missing data.
pub const HGT_VOID: i16 = -32768;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A decoded elevation raster in row-major order (row 0 = north edge).
///
/// Voids are stored as `NaN`.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    pub width: usize,
    pub height: usize,
    pub samples: Vec<f32>,
}

impl ElevationGrid {
    pub fn new(width: usize, height: usize, samples: Vec<f32>) -> ContourResult<Self> {
        if samples.len() != width * height {
            return Err(ContourError::InvalidRaster(format!(
                "expected {} samples for {}x{}, got {}",
                width * height,
                width,
                height,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.samples[row * self.width + col]
    }

    /// Minimum and maximum of the non-void samples.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.samples
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Decompress an HGT archive if it is gzipped, otherwise return it as-is.
pub fn inflate_hgt(bytes: &[u8]) -> ContourResult<Vec<u8>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut raw = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut raw)?;
        Ok(raw)
    } else {
        Ok(bytes.to_vec())
    }
}

/// Decode a raw or gzipped HGT raster.
pub fn decode_hgt(bytes: &[u8]) -> ContourResult<ElevationGrid> {
    let raw = inflate_hgt(bytes)?;

    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(ContourError::InvalidRaster(format!(
            "{} bytes is not a whole number of samples",
            raw.len()
        )));
    }

    let count = raw.len() / 2;
    let side = (count as f64).sqrt().round() as usize;
    if side < 2 || side * side != count {
        return Err(ContourError::InvalidRaster(format!(
            "{count} samples do not form a square grid"
        )));
    }

    let samples = raw
        .chunks_exact(2)
        .map(|pair| match i16::from_be_bytes([pair[0], pair[1]]) {
            HGT_VOID => f32::NAN,
            value => f32::from(value),
        })
        .collect();

    ElevationGrid::new(side, side, samples)
}
