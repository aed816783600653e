//! Common types and utilities shared across the terrain tile pipeline.

pub mod bbox;
pub mod dem;
pub mod error;
pub mod tile;

pub use bbox::BoundingBox;
pub use dem::DemCell;
pub use error::{TileError, TileResult};
pub use tile::{flip_row, tile_range, TileCoord, TileRange, ZoomRange};
