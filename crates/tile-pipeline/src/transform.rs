//! Raster-to-feature transformers for the contour pipeline.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use contour::hgt::inflate_hgt;
use contour::{decode_hgt, extract_contours, features_from_collection, ContourFeature, ContourParams};
use tile_common::DemCell;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::TransformError;

/// Turns one cell's elevation archive into contour features.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn extract_features(
        &self,
        cell: &DemCell,
        raster: Bytes,
    ) -> Result<Vec<ContourFeature>, TransformError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// External binaries this transformer needs on `PATH`.
    fn required_tools(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-process marching squares.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTransformer {
    params: ContourParams,
}

impl BuiltinTransformer {
    pub fn new(params: ContourParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Transformer for BuiltinTransformer {
    #[instrument(skip(self, raster), fields(cell = %cell, bytes = raster.len()))]
    async fn extract_features(
        &self,
        cell: &DemCell,
        raster: Bytes,
    ) -> Result<Vec<ContourFeature>, TransformError> {
        let params = self.params;
        let extent = cell.bounds();

        // CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || -> Result<Vec<ContourFeature>, TransformError> {
            let grid = decode_hgt(&raster)?;
            debug!(width = grid.width, height = grid.height, "Decoded raster");
            Ok(extract_contours(&grid, &extent, params))
        })
        .await
        .map_err(|e| TransformError::Join(e.to_string()))?
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

/// Shells out to `gdal_contour`.
#[derive(Debug, Clone)]
pub struct GdalContourTransformer {
    program: PathBuf,
    params: ContourParams,
}

impl GdalContourTransformer {
    pub const PROGRAM: &'static str = "gdal_contour";

    pub fn new(params: ContourParams) -> Self {
        Self {
            program: PathBuf::from(Self::PROGRAM),
            params,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Transformer for GdalContourTransformer {
    #[instrument(skip(self, raster), fields(cell = %cell, bytes = raster.len()))]
    async fn extract_features(
        &self,
        cell: &DemCell,
        raster: Bytes,
    ) -> Result<Vec<ContourFeature>, TransformError> {
        let hgt = tokio::task::spawn_blocking(move || inflate_hgt(&raster))
            .await
            .map_err(|e| TransformError::Join(e.to_string()))??;

        // GDAL infers the cell georeference from the file name.
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join(format!("{}.hgt", cell.name()));
        let output = scratch.path().join(format!("{}.geojson", cell.name()));
        tokio::fs::write(&input, &hgt).await?;

        let result = Command::new(&self.program)
            .arg("-a")
            .arg("height")
            .arg("-i")
            .arg(self.params.interval.to_string())
            .arg("-f")
            .arg("GeoJSON")
            .arg(&input)
            .arg(&output)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !result.status.success() {
            return Err(TransformError::Tool {
                tool: self.program.display().to_string(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let collection = tokio::fs::read_to_string(&output).await?;
        let features = features_from_collection(&collection, "height", self.params.index_interval)?;
        Ok(merge_levels(features))
    }

    fn name(&self) -> &'static str {
        "gdal_contour"
    }

    fn required_tools(&self) -> Vec<String> {
        vec![self.program.display().to_string()]
    }
}

/// Combine features sharing an elevation into one feature per level,
/// ascending, matching the builtin transformer's output shape.
fn merge_levels(features: Vec<ContourFeature>) -> Vec<ContourFeature> {
    use contour::Geometry;
    use std::collections::BTreeMap;

    let mut levels: BTreeMap<i64, (ContourFeature, Vec<Vec<[f64; 2]>>)> = BTreeMap::new();
    for feature in features {
        let lines = match &feature.geometry {
            Geometry::LineString(line) => vec![line.clone()],
            Geometry::MultiLineString(lines) => lines.clone(),
        };
        let key = (feature.elevation * 1000.0).round() as i64;
        levels
            .entry(key)
            .or_insert_with(|| (feature, Vec::new()))
            .1
            .extend(lines);
    }

    levels
        .into_values()
        .filter_map(|(template, lines)| {
            Geometry::from_lines(lines).map(|geometry| ContourFeature {
                geometry,
                ..template
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour::{Geometry, LineClass};
    use test_utils::{flat_hgt_gz, hill_hgt_gz};

    fn cell() -> DemCell {
        DemCell::new(57, 4).unwrap()
    }

    #[tokio::test]
    async fn test_builtin_extracts_hill() {
        let transformer = BuiltinTransformer::default();
        let raster = Bytes::from(hill_hgt_gz(41, 200, 0));
        let features = transformer.extract_features(&cell(), raster).await.unwrap();
        assert_eq!(features.len(), 19);
        assert_eq!(features[9].elevation, 100.0);
        assert_eq!(features[9].line_class, LineClass::Major);
    }

    #[tokio::test]
    async fn test_builtin_flat_raster_is_empty() {
        let transformer = BuiltinTransformer::default();
        let raster = Bytes::from(flat_hgt_gz(21, 250));
        assert!(transformer
            .extract_features(&cell(), raster)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_builtin_rejects_garbage() {
        let transformer = BuiltinTransformer::default();
        let result = transformer
            .extract_features(&cell(), Bytes::from_static(b"not a raster"))
            .await;
        assert!(matches!(result, Err(TransformError::Contour(_))));
    }

    #[tokio::test]
    async fn test_gdal_missing_program_is_io_error() {
        let transformer = GdalContourTransformer::new(ContourParams::default())
            .with_program("/nonexistent/gdal_contour");
        let result = transformer
            .extract_features(&cell(), Bytes::from(flat_hgt_gz(3, 10)))
            .await;
        assert!(matches!(result, Err(TransformError::Io(_))));
    }

    #[test]
    fn test_merge_levels_groups_by_elevation() {
        let line = |x: f64| vec![[x, 0.0], [x, 1.0]];
        let features = vec![
            ContourFeature {
                elevation: 20.0,
                line_class: LineClass::Ordinary,
                geometry: Geometry::LineString(line(0.0)),
            },
            ContourFeature {
                elevation: 10.0,
                line_class: LineClass::Ordinary,
                geometry: Geometry::LineString(line(1.0)),
            },
            ContourFeature {
                elevation: 20.0,
                line_class: LineClass::Ordinary,
                geometry: Geometry::LineString(line(2.0)),
            },
        ];

        let merged = merge_levels(features);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].elevation, 10.0);
        assert_eq!(merged[1].geometry.line_count(), 2);
    }
}
