//! Contour extraction from an elevation grid into geographic features.

use rayon::prelude::*;
use tile_common::BoundingBox;
use tracing::debug;

use crate::classify::{classify, contour_levels};
use crate::feature::{ContourFeature, Geometry, Position};
use crate::hgt::ElevationGrid;
use crate::march::{connect_segments, march_squares, Point};

/// Contour spacing and index-line selection, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourParams {
    pub interval: f64,
    pub index_interval: f64,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            interval: 10.0,
            index_interval: 50.0,
        }
    }
}

/// Extract one feature per contour level present in `grid`.
///
/// `extent` is the geographic footprint of the grid: sample `(0, 0)` sits at
/// the north-west corner and the last sample at the south-east corner.
/// Levels at or below sea level are dropped. Features are ordered by
/// ascending elevation.
pub fn extract_contours(
    grid: &ElevationGrid,
    extent: &BoundingBox,
    params: ContourParams,
) -> Vec<ContourFeature> {
    let Some((min_value, max_value)) = grid.value_range() else {
        return vec![];
    };

    let levels = contour_levels(f64::from(min_value), f64::from(max_value), params.interval);
    if levels.is_empty() {
        return vec![];
    }

    let to_geo = GridTransform::new(grid, extent);

    let features: Vec<ContourFeature> = levels
        .par_iter()
        .filter_map(|&level| {
            let line_class = classify(level, params.index_interval)?;
            let segments = march_squares(&grid.samples, grid.width, grid.height, level as f32);
            let lines = connect_segments(&segments)
                .into_iter()
                .map(|line| line.points.iter().map(|p| to_geo.apply(p)).collect())
                .collect();

            Geometry::from_lines(lines).map(|geometry| ContourFeature {
                elevation: level,
                line_class,
                geometry,
            })
        })
        .collect();

    debug!(
        levels = levels.len(),
        features = features.len(),
        "Extracted contours"
    );

    features
}

/// Affine mapping from grid space to `[lon, lat]`.
struct GridTransform {
    west: f64,
    north: f64,
    lon_step: f64,
    lat_step: f64,
}

impl GridTransform {
    fn new(grid: &ElevationGrid, extent: &BoundingBox) -> Self {
        let cols = (grid.width.max(2) - 1) as f64;
        let rows = (grid.height.max(2) - 1) as f64;
        Self {
            west: extent.west,
            north: extent.north,
            lon_step: extent.width() / cols,
            lat_step: extent.height() / rows,
        }
    }

    fn apply(&self, point: &Point) -> Position {
        [
            self.west + point.x * self.lon_step,
            self.north - point.y * self.lat_step,
        ]
    }
}
