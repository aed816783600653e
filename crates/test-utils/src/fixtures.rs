//! Common test fixtures for terrain pipeline tests.

/// Bounding boxes as `(west, south, east, north)`.
pub mod bbox {
    /// Southern Norway coast, small enough for zoom 8-9 end-to-end runs.
    pub const SOUTH_NORWAY: (f64, f64, f64, f64) = (4.0, 57.0, 6.0, 59.0);
}

/// Deterministic payload served for a tile by the stub source.
pub fn tile_payload(z: u8, x: u32, y: u32) -> Vec<u8> {
    format!("tile:{z}/{x}/{y}").into_bytes()
}
