//! Error types for raster decoding and feature encoding.

use thiserror::Error;

pub type ContourResult<T> = Result<T, ContourError>;

#[derive(Debug, Error)]
pub enum ContourError {
    #[error("Invalid HGT raster: {0}")]
    InvalidRaster(String),

    #[error("Failed to decompress raster: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] serde_json::Error),

    #[error("Feature is missing a numeric '{0}' property")]
    MissingProperty(&'static str),
}
