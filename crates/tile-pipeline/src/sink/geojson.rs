//! Per-cell GeoJSON fragments merged into one line-delimited feed.
//!
//! Each cell with features gets `{work_dir}/{cell}.geojsonl`, written via a
//! temp file and rename, so a fragment is either complete or absent.
//! Fragment presence is what marks a cell as done. The work directory may
//! hold fragments from earlier runs over other areas; only cells in the
//! sink's scope are merged.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use contour::ContourFeature;
use tile_common::DemCell;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{Sink, SinkReport};
use crate::error::PipelineResult;
use crate::existing::ExistingSet;
use crate::worker::Outcome;

const FRAGMENT_EXTENSION: &str = "geojsonl";

pub struct GeoJsonMergeSink {
    work_dir: PathBuf,
    output: PathBuf,
    scope: Option<HashSet<String>>,
    written: u64,
}

impl GeoJsonMergeSink {
    pub async fn new(work_dir: impl Into<PathBuf>, output: impl Into<PathBuf>) -> PipelineResult<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir).await?;
        Ok(Self {
            work_dir,
            output: output.into(),
            scope: None,
            written: 0,
        })
    }

    /// Merge only fragments of these cells. Without a scope every fragment
    /// in the work directory is merged.
    pub fn with_cells(mut self, cells: impl IntoIterator<Item = DemCell>) -> Self {
        self.scope = Some(cells.into_iter().map(|cell| cell.name()).collect());
        self
    }

    fn in_scope(&self, path: &Path) -> bool {
        match (&self.scope, path.file_stem().and_then(|s| s.to_str())) {
            (None, _) => true,
            (Some(scope), Some(name)) => scope.contains(name),
            (Some(_), None) => false,
        }
    }

    pub fn fragment_path(&self, cell: &DemCell) -> PathBuf {
        self.work_dir
            .join(format!("{}.{FRAGMENT_EXTENSION}", cell.name()))
    }

    /// Fragment files currently present, sorted by name.
    async fn fragments(&self) -> PipelineResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.work_dir).await?;
        let mut fragments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(FRAGMENT_EXTENSION) {
                fragments.push(path);
            }
        }
        fragments.sort();
        Ok(fragments)
    }

    async fn write_fragment(&self, cell: &DemCell, features: &[ContourFeature]) -> PipelineResult<()> {
        let mut body = String::new();
        for feature in features {
            body.push_str(&feature.to_geojson_line()?);
            body.push('\n');
        }

        let path = self.fragment_path(cell);
        let temp = path.with_extension(format!("{FRAGMENT_EXTENSION}.partial"));
        fs::write(&temp, body).await?;
        fs::rename(&temp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for GeoJsonMergeSink {
    type Key = DemCell;
    type Output = Vec<ContourFeature>;

    async fn load_existing(&mut self, _level: u8) -> PipelineResult<ExistingSet<String>> {
        let names: HashSet<String> = self
            .fragments()
            .await?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();

        debug!(existing = names.len(), "Loaded existing fragments");
        Ok(ExistingSet::new(names))
    }

    async fn accept(
        &mut self,
        cell: &DemCell,
        outcome: Outcome<Vec<ContourFeature>>,
    ) -> PipelineResult<()> {
        if let Outcome::Stored(features) = outcome {
            if !features.is_empty() {
                self.write_fragment(cell, &features).await?;
                self.written += 1;
            }
        }
        Ok(())
    }

    async fn end_level(&mut self, _level: u8) -> PipelineResult<()> {
        Ok(())
    }

    /// Concatenate the in-scope fragments into the output feed.
    async fn finish(&mut self) -> PipelineResult<SinkReport> {
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let fragments: Vec<PathBuf> = self
            .fragments()
            .await?
            .into_iter()
            .filter(|path| self.in_scope(path))
            .collect();
        let temp = self.output.with_extension("partial");
        let mut merged = fs::File::create(&temp).await?;
        let mut lines = 0usize;

        for fragment in &fragments {
            let body = fs::read(fragment).await?;
            if body.is_empty() {
                continue;
            }
            lines += body.iter().filter(|&&b| b == b'\n').count();
            merged.write_all(&body).await?;
            if body.last() != Some(&b'\n') {
                merged.write_all(b"\n").await?;
                lines += 1;
            }
        }

        merged.flush().await?;
        drop(merged);
        fs::rename(&temp, &self.output).await?;

        info!(
            output = %self.output.display(),
            fragments = fragments.len(),
            features = lines,
            "Merged contour fragments"
        );

        Ok(SinkReport {
            written: self.written,
            location: self.output.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour::{Geometry, LineClass};

    fn feature(elevation: f64) -> ContourFeature {
        ContourFeature {
            elevation,
            line_class: LineClass::Ordinary,
            geometry: Geometry::LineString(vec![[4.0, 57.0], [4.1, 57.1]]),
        }
    }

    #[tokio::test]
    async fn test_fragments_mark_cells_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = GeoJsonMergeSink::new(dir.path().join("work"), dir.path().join("out.geojsonl"))
            .await
            .unwrap();

        let done = DemCell::new(57, 4).unwrap();
        let empty = DemCell::new(57, 5).unwrap();
        sink.accept(&done, Outcome::Stored(vec![feature(10.0)])).await.unwrap();
        sink.accept(&empty, Outcome::Stored(vec![])).await.unwrap();

        let existing = sink.load_existing(0).await.unwrap();
        assert!(existing.contains(&"N57E004".to_string()));
        assert!(!existing.contains(&"N57E005".to_string()));
        assert_eq!(existing.len(), 1);
    }

    #[tokio::test]
    async fn test_finish_merges_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("contours.geojsonl");
        let mut sink = GeoJsonMergeSink::new(dir.path().join("work"), &output).await.unwrap();

        let north = DemCell::new(58, 4).unwrap();
        let south = DemCell::new(57, 4).unwrap();
        sink.accept(&north, Outcome::Stored(vec![feature(30.0)])).await.unwrap();
        sink.accept(&south, Outcome::Stored(vec![feature(10.0), feature(20.0)]))
            .await
            .unwrap();

        let report = sink.finish().await.unwrap();
        assert_eq!(report.written, 2);

        let merged = std::fs::read_to_string(&output).unwrap();
        let heights: Vec<f64> = merged
            .lines()
            .map(|line| ContourFeature::from_geojson_line(line).unwrap().elevation)
            .collect();
        assert_eq!(heights, vec![10.0, 20.0, 30.0]);
    }

    #[tokio::test]
    async fn test_fragments_outside_scope_are_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let output = dir.path().join("contours.geojsonl");

        // Left over from a run over another area.
        let mut earlier = GeoJsonMergeSink::new(&work, &output).await.unwrap();
        let alps = DemCell::new(46, 10).unwrap();
        earlier.accept(&alps, Outcome::Stored(vec![feature(900.0)])).await.unwrap();

        let cell = DemCell::new(57, 4).unwrap();
        let mut sink = GeoJsonMergeSink::new(&work, &output)
            .await
            .unwrap()
            .with_cells([cell, DemCell::new(57, 5).unwrap()]);
        sink.accept(&cell, Outcome::Stored(vec![feature(10.0)])).await.unwrap();
        sink.finish().await.unwrap();

        let merged = std::fs::read_to_string(&output).unwrap();
        let heights: Vec<f64> = merged
            .lines()
            .map(|line| ContourFeature::from_geojson_line(line).unwrap().elevation)
            .collect();
        assert_eq!(heights, vec![10.0]);
        assert!(sink.fragment_path(&alps).exists());
    }
}
