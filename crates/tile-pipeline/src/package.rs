//! External tool checks and vector-tile packaging.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tile_common::ZoomRange;
use tokio::process::Command;
use tracing::{info, instrument};

use crate::error::{PipelineError, PipelineResult};

/// Resolve every tool on `PATH`, failing on the first one missing.
pub fn require_tools<S: AsRef<str>>(tools: &[S]) -> PipelineResult<Vec<PathBuf>> {
    tools
        .iter()
        .map(|tool| {
            let tool = tool.as_ref();
            which::which(tool).map_err(|_| PipelineError::MissingDependency(tool.to_string()))
        })
        .collect()
}

/// Packs a line-delimited GeoJSON feed into an MBTiles vector tileset.
#[derive(Debug, Clone)]
pub struct Packager {
    program: PathBuf,
    layer: String,
}

impl Packager {
    pub const TIPPECANOE: &'static str = "tippecanoe";

    pub fn tippecanoe() -> Self {
        Self {
            program: PathBuf::from(Self::TIPPECANOE),
            layer: "contours".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self, input: &Path, output: &Path, zooms: ZoomRange) -> Vec<OsString> {
        vec![
            "-o".into(),
            output.as_os_str().to_owned(),
            format!("-Z{}", zooms.min).into(),
            format!("-z{}", zooms.max).into(),
            "-l".into(),
            self.layer.clone().into(),
            "--force".into(),
            input.as_os_str().to_owned(),
        ]
    }

    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub async fn package(&self, input: &Path, output: &Path, zooms: ZoomRange) -> PipelineResult<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = Command::new(&self.program)
            .args(self.args(input, output, zooms))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !result.status.success() {
            return Err(PipelineError::Packager {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        info!(output = %output.display(), "Packaged vector tiles");
        Ok(())
    }
}
