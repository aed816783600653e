//! Geographic bounding boxes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// A geographic bounding box in WGS84 degrees.
///
/// Always satisfies `west < east` and `south < north` when built through
/// [`BoundingBox::new`]. Boxes crossing the antimeridian are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Create a validated bounding box from its edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> TileResult<Self> {
        let bbox = Self {
            west,
            south,
            east,
            north,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// The whole world, clipped to the Mercator latitude limit.
    pub fn world() -> Self {
        Self {
            west: -180.0,
            south: -crate::tile::MAX_MERCATOR_LAT,
            east: 180.0,
            north: crate::tile::MAX_MERCATOR_LAT,
        }
    }

    fn validate(&self) -> TileResult<()> {
        let edges = [self.west, self.south, self.east, self.north];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(TileError::InvalidBbox(format!("{self}: non-finite edge")));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(TileError::InvalidBbox(format!(
                "{self}: longitude outside [-180, 180]"
            )));
        }
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(TileError::InvalidBbox(format!(
                "{self}: latitude outside [-90, 90]"
            )));
        }
        if self.west >= self.east {
            return Err(TileError::InvalidBbox(format!(
                "{self}: west must be less than east"
            )));
        }
        if self.south >= self.north {
            return Err(TileError::InvalidBbox(format!(
                "{self}: south must be less than north"
            )));
        }
        Ok(())
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center point as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        })
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// MBTiles `bounds` metadata value: "west,south,east,north".
    pub fn to_mbtiles_bounds(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6}",
            self.west, self.south, self.east, self.north
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Parses "west,south,east,north".
impl FromStr for BoundingBox {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(TileError::InvalidBbox(format!(
                "{s}. Expected 'west,south,east,north'"
            )));
        }

        let mut edges = [0.0f64; 4];
        for (edge, part) in edges.iter_mut().zip(&parts) {
            *edge = part
                .parse()
                .map_err(|_| TileError::InvalidNumber(part.to_string()))?;
        }

        Self::try_from(edges)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = TileError;

    fn try_from(edges: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(edges[0], edges[1], edges[2], edges[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.west, bbox.south, bbox.east, bbox.north]
    }
}
