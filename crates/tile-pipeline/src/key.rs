//! Work keys: what a worker processes and what a sink persists for it.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::path::PathBuf;

use tile_common::{DemCell, TileCoord};

/// A unit of work addressable by URL template and persisted under a
/// stored key.
pub trait WorkKey: Clone + Debug + Display + Send + Sync + 'static {
    /// The identity the sink records once the work is durable.
    type Stored: Clone + Debug + Eq + Hash + Send + Sync + 'static;

    /// Grouping level; zoom for tiles, `0` for DEM cells.
    fn level(&self) -> u8;

    fn stored_key(&self) -> Self::Stored;

    /// Substitute this key into a source URL template.
    fn render_url(&self, template: &str) -> String;

    /// Relative path under a cache directory.
    fn cache_path(&self) -> PathBuf;
}

impl WorkKey for TileCoord {
    /// `(tile_column, tile_row)` with the row flipped for storage.
    type Stored = (u32, u32);

    fn level(&self) -> u8 {
        self.z
    }

    fn stored_key(&self) -> Self::Stored {
        (self.x, self.storage_row())
    }

    /// Replaces `{z}`, `{x}` and `{y}`.
    fn render_url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }

    fn cache_path(&self) -> PathBuf {
        PathBuf::from(self.z.to_string())
            .join(self.x.to_string())
            .join(self.y.to_string())
    }
}

impl WorkKey for DemCell {
    /// The cell name, e.g. `N57E004`.
    type Stored = String;

    fn level(&self) -> u8 {
        0
    }

    fn stored_key(&self) -> Self::Stored {
        self.name()
    }

    /// Replaces `{band}` and `{cell}`.
    fn render_url(&self, template: &str) -> String {
        template
            .replace("{band}", &self.band())
            .replace("{cell}", &self.name())
    }

    fn cache_path(&self) -> PathBuf {
        PathBuf::from(self.band()).join(format!("{}.hgt.gz", self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key() {
        let tile = TileCoord::new(8, 131, 76);
        assert_eq!(tile.level(), 8);
        assert_eq!(tile.stored_key(), (131, 179));
        assert_eq!(
            tile.render_url("https://tiles.example/{z}/{x}/{y}.png"),
            "https://tiles.example/8/131/76.png"
        );
        assert_eq!(tile.cache_path(), PathBuf::from("8/131/76"));
    }

    #[test]
    fn test_cell_key() {
        let cell = DemCell::new(-1, -72).unwrap();
        assert_eq!(cell.level(), 0);
        assert_eq!(cell.stored_key(), "S01W072");
        assert_eq!(
            cell.render_url("https://dem.example/skadi/{band}/{cell}.hgt.gz"),
            "https://dem.example/skadi/S01/S01W072.hgt.gz"
        );
        assert_eq!(cell.cache_path(), PathBuf::from("S01/S01W072.hgt.gz"));
    }
}
