//! Contour level selection and index-line classification.

use serde::{Deserialize, Serialize};

/// Emphasis class of a contour line, written as the `nth_line` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LineClass {
    /// Every line that is not an index line.
    Ordinary,
    /// Minor index line (every `index_interval` metres).
    Minor,
    /// Major index line (every 100 m).
    Major,
}

impl LineClass {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Ordinary => 1,
            Self::Minor => 5,
            Self::Major => 10,
        }
    }
}

impl From<LineClass> for u8 {
    fn from(class: LineClass) -> Self {
        class.as_u8()
    }
}

impl TryFrom<u8> for LineClass {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ordinary),
            5 => Ok(Self::Minor),
            10 => Ok(Self::Major),
            other => Err(format!("invalid nth_line value {other}")),
        }
    }
}

/// Spacing of major index lines in metres.
pub const MAJOR_INTERVAL: f64 = 100.0;

fn is_multiple(value: f64, interval: f64) -> bool {
    interval > 0.0 && (value % interval).abs() < 1e-9
}

/// Classify a contour elevation.
///
/// Returns `None` for elevations at or below sea level, which are dropped.
pub fn classify(elevation: f64, index_interval: f64) -> Option<LineClass> {
    if !elevation.is_finite() || elevation <= 0.0 {
        return None;
    }
    if is_multiple(elevation, MAJOR_INTERVAL) {
        Some(LineClass::Major)
    } else if is_multiple(elevation, index_interval) {
        Some(LineClass::Minor)
    } else {
        Some(LineClass::Ordinary)
    }
}

/// Contour levels strictly between `min_value` and `max_value`, on
/// multiples of `interval`, above sea level.
pub fn contour_levels(min_value: f64, max_value: f64, interval: f64) -> Vec<f64> {
    if interval <= 0.0 || !(max_value > min_value) {
        return vec![];
    }

    let first = ((min_value / interval).floor() + 1.0).max(1.0);
    let last = (max_value / interval).ceil() - 1.0;
    if last < first {
        return vec![];
    }

    (first as i64..=last as i64)
        .map(|step| step as f64 * interval)
        .collect()
}
