//! Contour extraction for elevation rasters.
//!
//! Decodes SRTM-style HGT archives into an [`ElevationGrid`], extracts
//! isolines with marching squares and encodes them as line-delimited GeoJSON
//! [`ContourFeature`]s tagged with an index-line class.

pub mod classify;
pub mod error;
pub mod extract;
pub mod feature;
pub mod hgt;
pub mod march;

pub use classify::{classify, contour_levels, LineClass};
pub use error::{ContourError, ContourResult};
pub use extract::{extract_contours, ContourParams};
pub use feature::{features_from_collection, ContourFeature, Geometry, Position};
pub use hgt::{decode_hgt, ElevationGrid};
