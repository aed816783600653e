//! One-degree elevation cells in SRTM/HGT naming.
//!
//! A cell is identified by its south-west corner and named
//! `N|S` + two-digit latitude + `E|W` + three-digit longitude, e.g.
//! `N57E004` or `S01W072`. Archives are grouped by latitude band (`N57`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::BoundingBox;

/// A 1°×1° elevation cell keyed by its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DemCell {
    pub lat: i16,
    pub lon: i16,
}

impl DemCell {
    pub fn new(lat: i16, lon: i16) -> TileResult<Self> {
        if !(-90..90).contains(&lat) || !(-180..180).contains(&lon) {
            return Err(TileError::InvalidCell(format!("lat={lat}, lon={lon}")));
        }
        Ok(Self { lat, lon })
    }

    /// Latitude band directory, e.g. `N57`.
    pub fn band(&self) -> String {
        let hemisphere = if self.lat < 0 { 'S' } else { 'N' };
        format!("{}{:02}", hemisphere, self.lat.unsigned_abs())
    }

    /// Full cell name, e.g. `N57E004`.
    pub fn name(&self) -> String {
        let meridian = if self.lon < 0 { 'W' } else { 'E' };
        format!("{}{}{:03}", self.band(), meridian, self.lon.unsigned_abs())
    }

    /// Geographic extent of the cell.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox {
            west: f64::from(self.lon),
            south: f64::from(self.lat),
            east: f64::from(self.lon) + 1.0,
            north: f64::from(self.lat) + 1.0,
        }
    }

    /// Cells overlapping `bbox`, latitude ascending then longitude ascending.
    pub fn covering(bbox: &BoundingBox) -> impl Iterator<Item = DemCell> + Send + 'static {
        let lat_start = bbox.south.floor().max(-90.0) as i16;
        let lat_end = bbox.north.ceil().min(90.0) as i16;
        let lon_start = bbox.west.floor().max(-180.0) as i16;
        let lon_end = bbox.east.ceil().min(180.0) as i16;

        (lat_start..lat_end)
            .flat_map(move |lat| (lon_start..lon_end).map(move |lon| DemCell { lat, lon }))
    }

    /// Number of cells [`DemCell::covering`] yields for `bbox`.
    pub fn count_covering(bbox: &BoundingBox) -> u64 {
        let lat_span = bbox.north.ceil().min(90.0) - bbox.south.floor().max(-90.0);
        let lon_span = bbox.east.ceil().min(180.0) - bbox.west.floor().max(-180.0);
        (lat_span.max(0.0) * lon_span.max(0.0)) as u64
    }
}

impl fmt::Display for DemCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for DemCell {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TileError::InvalidCell(s.to_string());

        let bytes = s.as_bytes();
        if bytes.len() != 7 || !s.is_ascii() {
            return Err(invalid());
        }

        let lat_sign = match bytes[0] {
            b'N' | b'n' => 1,
            b'S' | b's' => -1,
            _ => return Err(invalid()),
        };
        let lon_sign = match bytes[3] {
            b'E' | b'e' => 1,
            b'W' | b'w' => -1,
            _ => return Err(invalid()),
        };

        let lat: i16 = s[1..3].parse().map_err(|_| invalid())?;
        let lon: i16 = s[4..7].parse().map_err(|_| invalid())?;

        Self::new(lat_sign * lat, lon_sign * lon).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_names() {
        assert_eq!(DemCell::new(57, 4).unwrap().name(), "N57E004");
        assert_eq!(DemCell::new(-1, -72).unwrap().name(), "S01W072");
        assert_eq!(DemCell::new(0, 0).unwrap().name(), "N00E000");
        assert_eq!(DemCell::new(-1, -72).unwrap().band(), "S01");
    }

    #[test]
    fn test_parse_roundtrip_name() {
        let cell: DemCell = "S33W071".parse().unwrap();
        assert_eq!(cell, DemCell { lat: -33, lon: -71 });
        assert!("X33W071".parse::<DemCell>().is_err());
        assert!("N33W07".parse::<DemCell>().is_err());
    }

    #[test]
    fn test_covering_cells() {
        let bbox = BoundingBox::new(4.0, 57.0, 6.0, 59.0).unwrap();
        let cells: Vec<String> = DemCell::covering(&bbox).map(|c| c.name()).collect();
        assert_eq!(cells, vec!["N57E004", "N57E005", "N58E004", "N58E005"]);
        assert_eq!(DemCell::count_covering(&bbox), 4);

        let partial = BoundingBox::new(4.5, 57.2, 5.5, 57.8).unwrap();
        assert_eq!(DemCell::covering(&partial).count(), 2);
        assert_eq!(DemCell::count_covering(&partial), 2);
    }
}
