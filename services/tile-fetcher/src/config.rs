//! Dataset configuration loaded from YAML.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Command-line flags are applied on top in `main.rs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use contour::ContourParams;
use serde::Deserialize;
use tile_common::{BoundingBox, ZoomRange};
use tile_pipeline::config::{default_download_concurrency, default_transform_concurrency};
use tile_pipeline::RetryConfig;
use tracing::info;

/// Root of a run configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Area to cover, `[west, south, east, north]`.
    pub bbox: BoundingBox,
    pub attribution: String,
    pub request_timeout_secs: u64,
    /// Advisory cache for raw source bytes.
    pub cache_dir: Option<PathBuf>,
    pub retry: RetrySettings,
    pub terrain: TerrainConfig,
    pub contours: ContourConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            bbox: default_bbox(),
            attribution: default_attribution(),
            request_timeout_secs: 60,
            cache_dir: None,
            retry: RetrySettings::default(),
            terrain: TerrainConfig::default(),
            contours: ContourConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

/// Pre-rendered elevation tiles into an MBTiles store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub name: String,
    pub description: String,
    /// Source template with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    /// Tile format recorded in the store metadata.
    pub format: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            name: "terrain".to_string(),
            description: "Terrarium-encoded elevation tiles".to_string(),
            url_template: "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png"
                .to_string(),
            format: "png".to_string(),
            min_zoom: 0,
            max_zoom: 12,
            concurrency: default_download_concurrency(),
            batch_size: tile_pipeline::sink::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Contour extraction backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ContourEngine {
    /// In-process marching squares.
    Builtin,
    /// Shell out to `gdal_contour`.
    Gdal,
}

/// Elevation archives into a contour vector tileset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Source template with `{band}` and `{cell}` placeholders.
    pub url_template: String,
    pub engine: ContourEngine,
    /// Contour spacing in metres.
    pub interval: f64,
    /// Spacing of minor index lines in metres.
    pub index_interval: f64,
    /// Zoom range handed to the packager.
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub concurrency: usize,
    /// Per-cell fragments; kept between runs for resume.
    pub work_dir: PathBuf,
}

impl Default for ContourConfig {
    fn default() -> Self {
        let params = ContourParams::default();
        Self {
            url_template: "https://s3.amazonaws.com/elevation-tiles-prod/skadi/{band}/{cell}.hgt.gz"
                .to_string(),
            engine: ContourEngine::Builtin,
            interval: params.interval,
            index_interval: params.index_interval,
            min_zoom: 9,
            max_zoom: 14,
            concurrency: default_transform_concurrency(),
            work_dir: PathBuf::from("data/contours-work"),
        }
    }
}

impl ContourConfig {
    pub fn params(&self) -> ContourParams {
        ContourParams {
            interval: self.interval,
            index_interval: self.index_interval,
        }
    }
}

fn default_bbox() -> BoundingBox {
    BoundingBox {
        west: 4.0,
        south: 57.0,
        east: 6.0,
        north: 59.0,
    }
}

fn default_attribution() -> String {
    "Mapzen terrain tiles; SRTM, GMTED, ETOPO1".to_string()
}

impl RunConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RunConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), bbox = %config.bbox, "Loaded run configuration");
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn terrain_zooms(&self) -> Result<ZoomRange> {
        ZoomRange::new(self.terrain.min_zoom, self.terrain.max_zoom)
            .context("Invalid terrain zoom range")
    }

    pub fn contour_zooms(&self) -> Result<ZoomRange> {
        ZoomRange::new(self.contours.min_zoom, self.contours.max_zoom)
            .context("Invalid contour zoom range")
    }
}
