//! Work enumeration: the keys a run must cover, grouped by level.

use tile_common::{tile_range, BoundingBox, DemCell, TileCoord, ZoomRange};

/// All work for one level, produced lazily.
pub struct LevelPlan<K> {
    pub level: u8,
    /// Number of keys `items` yields.
    pub total: u64,
    pub items: Box<dyn Iterator<Item = K> + Send>,
}

impl<K> std::fmt::Debug for LevelPlan<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelPlan")
            .field("level", &self.level)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// Every tile covering `bbox` in `zooms`: zoom ascending, then x, then y.
pub fn enumerate_tiles(
    bbox: &BoundingBox,
    zooms: ZoomRange,
) -> impl Iterator<Item = TileCoord> + Send + 'static {
    let bbox = *bbox;
    zooms.iter().flat_map(move |zoom| tile_range(&bbox, zoom).iter())
}

/// One plan per zoom level.
pub fn plan_tiles(bbox: &BoundingBox, zooms: ZoomRange) -> Vec<LevelPlan<TileCoord>> {
    zooms
        .iter()
        .map(|zoom| {
            let range = tile_range(bbox, zoom);
            LevelPlan {
                level: zoom,
                total: range.len(),
                items: Box::new(range.iter()),
            }
        })
        .collect()
}

/// Tile count for `bbox` across `zooms`, without iterating.
pub fn total_tiles(bbox: &BoundingBox, zooms: ZoomRange) -> u64 {
    zooms.iter().map(|zoom| tile_range(bbox, zoom).len()).sum()
}

/// Every 1° elevation cell overlapping `bbox`.
pub fn enumerate_cells(bbox: &BoundingBox) -> impl Iterator<Item = DemCell> + Send + 'static {
    DemCell::covering(bbox)
}

/// DEM cells form a single level `0`.
pub fn plan_cells(bbox: &BoundingBox) -> Vec<LevelPlan<DemCell>> {
    vec![LevelPlan {
        level: 0,
        total: DemCell::count_covering(bbox),
        items: Box::new(enumerate_cells(bbox)),
    }]
}
