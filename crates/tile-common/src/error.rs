//! Error types for tile math and dataset descriptions.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Errors raised while validating dataset geometry.
#[derive(Debug, Error, PartialEq)]
pub enum TileError {
    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),

    #[error("Invalid zoom range {min}..={max}: {message}")]
    InvalidZoomRange { min: u8, max: u8, message: String },

    #[error("Invalid DEM cell name: {0}")]
    InvalidCell(String),
}
