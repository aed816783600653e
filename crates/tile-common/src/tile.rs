//! Web Mercator slippy-map tile math.
//!
//! Tiles are addressed XYZ-style (`y = 0` at the north edge). Tile stores
//! that number rows from the south (MBTiles/TMS) use [`flip_row`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::BoundingBox;

/// Highest zoom level accepted by [`ZoomRange`].
pub const MAX_ZOOM: u8 = 22;

/// Latitude limit of the spherical Mercator projection (degrees).
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u8,
    /// Column (x)
    pub x: u32,
    /// Row (y), counted from the north edge
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Row index in south-up numbering.
    pub fn storage_row(&self) -> u32 {
        flip_row(self.z, self.y)
    }

    /// Whether x and y lie inside the grid for this zoom.
    pub fn is_valid(&self) -> bool {
        let n = tile_count_per_axis(self.z);
        self.x < n && self.y < n
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Get the four children tiles (zoom + 1).
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Inclusive range of zoom levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> TileResult<Self> {
        if min > max {
            return Err(TileError::InvalidZoomRange {
                min,
                max,
                message: "min zoom exceeds max zoom".to_string(),
            });
        }
        if max > MAX_ZOOM {
            return Err(TileError::InvalidZoomRange {
                min,
                max,
                message: format!("max zoom is limited to {MAX_ZOOM}"),
            });
        }
        Ok(Self { min, max })
    }

    /// Zoom levels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> {
        self.min..=self.max
    }

    pub fn contains(&self, zoom: u8) -> bool {
        (self.min..=self.max).contains(&zoom)
    }
}

impl fmt::Display for ZoomRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Inclusive tile rectangle at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileRange {
    pub fn width(&self) -> u64 {
        u64::from(self.x_max - self.x_min) + 1
    }

    pub fn height(&self) -> u64 {
        u64::from(self.y_max - self.y_min) + 1
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> u64 {
        self.width() * self.height()
    }

    /// A range always holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        coord.z == self.zoom
            && (self.x_min..=self.x_max).contains(&coord.x)
            && (self.y_min..=self.y_max).contains(&coord.y)
    }

    /// Tiles in x-major order (x ascending, then y ascending).
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + Send + 'static {
        let TileRange {
            zoom,
            x_min,
            x_max,
            y_min,
            y_max,
        } = *self;
        (x_min..=x_max).flat_map(move |x| (y_min..=y_max).map(move |y| TileCoord::new(zoom, x, y)))
    }
}

/// Number of tiles along one axis at `zoom`.
pub fn tile_count_per_axis(zoom: u8) -> u32 {
    2u32.pow(u32::from(zoom))
}

fn lon_to_x(lon: f64, n: f64) -> f64 {
    ((lon + 180.0) / 360.0 * n).floor()
}

fn lat_to_y(lat: f64, n: f64) -> f64 {
    let lat_rad = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    ((1.0 - lat_rad.tan().asinh() / std::f64::consts::PI) / 2.0 * n).floor()
}

fn clamp_index(value: f64, n: u32) -> u32 {
    value.clamp(0.0, f64::from(n - 1)) as u32
}

/// Compute the inclusive tile rectangle covering `bbox` at `zoom`.
///
/// Latitudes beyond the Mercator limit are clamped to ±85.0511° before
/// projecting; the result is always inside `[0, 2^zoom - 1]`.
pub fn tile_range(bbox: &BoundingBox, zoom: u8) -> TileRange {
    let n_tiles = tile_count_per_axis(zoom);
    let n = f64::from(n_tiles);

    let x_min = clamp_index(lon_to_x(bbox.west, n), n_tiles);
    let x_max = clamp_index(lon_to_x(bbox.east, n), n_tiles);
    // North maps to the smaller row index.
    let y_min = clamp_index(lat_to_y(bbox.north, n), n_tiles);
    let y_max = clamp_index(lat_to_y(bbox.south, n), n_tiles);

    TileRange {
        zoom,
        x_min,
        x_max,
        y_min,
        y_max,
    }
}

/// Convert between XYZ and TMS row numbering. Involutive.
pub fn flip_row(zoom: u8, y: u32) -> u32 {
    tile_count_per_axis(zoom) - 1 - y
}

/// Convert lat/lon to the Web Mercator tile containing it.
pub fn latlon_to_tile(lat: f64, lon: f64, zoom: u8) -> TileCoord {
    let n_tiles = tile_count_per_axis(zoom);
    let n = f64::from(n_tiles);

    TileCoord {
        z: zoom,
        x: clamp_index(lon_to_x(lon, n), n_tiles),
        y: clamp_index(lat_to_y(lat, n), n_tiles),
    }
}

/// Convert Web Mercator tile coordinates to lat/lon bounds.
pub fn tile_to_latlon_bounds(coord: &TileCoord) -> BoundingBox {
    let n = f64::from(tile_count_per_axis(coord.z));

    let west = f64::from(coord.x) / n * 360.0 - 180.0;
    let east = f64::from(coord.x + 1) / n * 360.0 - 180.0;

    let north = (std::f64::consts::PI * (1.0 - 2.0 * f64::from(coord.y) / n))
        .sinh()
        .atan()
        .to_degrees();
    let south = (std::f64::consts::PI * (1.0 - 2.0 * f64::from(coord.y + 1) / n))
        .sinh()
        .atan()
        .to_degrees();

    BoundingBox {
        west,
        south,
        east,
        north,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_row_bounds() {
        assert_eq!(flip_row(0, 0), 0);
        assert_eq!(flip_row(1, 0), 1);
        assert_eq!(flip_row(8, 71), 184);
    }

    #[test]
    fn test_range_iter_order() {
        let range = TileRange {
            zoom: 3,
            x_min: 1,
            x_max: 2,
            y_min: 4,
            y_max: 5,
        };
        let tiles: Vec<_> = range.iter().collect();
        assert_eq!(
            tiles,
            vec![
                TileCoord::new(3, 1, 4),
                TileCoord::new(3, 1, 5),
                TileCoord::new(3, 2, 4),
                TileCoord::new(3, 2, 5),
            ]
        );
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn test_parent_children() {
        let tile = TileCoord::new(5, 10, 12);
        for child in tile.children() {
            assert_eq!(child.parent(), Some(tile));
        }
        assert_eq!(TileCoord::new(0, 0, 0).parent(), None);
    }
}
