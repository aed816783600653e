//! Contour features and their line-delimited GeoJSON encoding.
//!
//! Each feature is one line of the form
//! `{"type":"Feature","properties":{"height":120.0,"nth_line":1},"geometry":{...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{classify, LineClass};
use crate::error::{ContourError, ContourResult};

/// A position as `[lon, lat]`.
pub type Position = [f64; 2];

/// Line geometries emitted for contours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
}

impl Geometry {
    /// Build the tightest geometry for a set of lines; `None` when empty.
    pub fn from_lines(mut lines: Vec<Vec<Position>>) -> Option<Self> {
        lines.retain(|line| line.len() >= 2);
        match lines.len() {
            0 => None,
            1 => lines.pop().map(Geometry::LineString),
            _ => Some(Geometry::MultiLineString(lines)),
        }
    }

    pub fn line_count(&self) -> usize {
        match self {
            Self::LineString(_) => 1,
            Self::MultiLineString(lines) => lines.len(),
        }
    }
}

/// One contour level's geometry with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourFeature {
    pub elevation: f64,
    pub line_class: LineClass,
    pub geometry: Geometry,
}

#[derive(Serialize, Deserialize)]
struct Properties {
    height: f64,
    nth_line: LineClass,
}

#[derive(Serialize, Deserialize)]
struct FeatureDocument {
    #[serde(rename = "type")]
    kind: String,
    properties: Properties,
    geometry: Geometry,
}

impl ContourFeature {
    /// Classify and wrap a geometry; `None` when the elevation is dropped.
    pub fn classified(elevation: f64, index_interval: f64, geometry: Geometry) -> Option<Self> {
        classify(elevation, index_interval).map(|line_class| Self {
            elevation,
            line_class,
            geometry,
        })
    }

    /// Encode as a single GeoJSON line (no trailing newline).
    pub fn to_geojson_line(&self) -> ContourResult<String> {
        let document = FeatureDocument {
            kind: "Feature".to_string(),
            properties: Properties {
                height: self.elevation,
                nth_line: self.line_class,
            },
            geometry: self.geometry.clone(),
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Decode a line written by [`ContourFeature::to_geojson_line`].
    pub fn from_geojson_line(line: &str) -> ContourResult<Self> {
        let document: FeatureDocument = serde_json::from_str(line)?;
        Ok(Self {
            elevation: document.properties.height,
            line_class: document.properties.nth_line,
            geometry: document.geometry,
        })
    }
}

/// Read contour features from a GeoJSON FeatureCollection whose features
/// carry the elevation in `height_property` (e.g. `gdal_contour -a height`).
///
/// Features at or below sea level or without line geometry are dropped.
pub fn features_from_collection(
    collection: &str,
    height_property: &'static str,
    index_interval: f64,
) -> ContourResult<Vec<ContourFeature>> {
    let value: Value = serde_json::from_str(collection)?;
    let features = value
        .get("features")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let elevation = feature
            .get("properties")
            .and_then(|p| p.get(height_property))
            .and_then(Value::as_f64)
            .ok_or(ContourError::MissingProperty(height_property))?;

        let geometry = match feature.get("geometry") {
            Some(Value::Null) | None => continue,
            Some(raw) => match serde_json::from_value::<Geometry>(raw.clone()) {
                Ok(geometry) => geometry,
                Err(_) => continue,
            },
        };

        if let Some(contour) = ContourFeature::classified(elevation, index_interval, geometry) {
            out.push(contour);
        }
    }

    Ok(out)
}
