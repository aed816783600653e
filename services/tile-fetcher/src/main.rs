//! Tile fetcher.
//!
//! Builds offline elevation datasets for a bounding box:
//! - `terrain`: downloads pre-rendered elevation tiles into an MBTiles store
//! - `contours`: fetches 1° elevation cells, extracts contour lines and
//!   packages them as vector tiles
//!
//! Both commands resume from whatever the output already holds.

mod commands;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tile_common::BoundingBox;
use tile_pipeline::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::{ContourEngine, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "tile-fetcher")]
#[command(about = "Resumable elevation tile and contour dataset builder")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Run configuration (YAML); flags below override it
    #[arg(long, global = true, env = "TILE_FETCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Area to cover as "west,south,east,north"
    #[arg(long, global = true, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Lowest zoom level
    #[arg(long, global = true)]
    min_zoom: Option<u8>,

    /// Highest zoom level
    #[arg(long, global = true)]
    max_zoom: Option<u8>,

    /// Maximum in-flight work items
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Retries per item after the first attempt
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Cache raw source bytes here
    #[arg(long, global = true, env = "TILE_FETCHER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download elevation tiles into an MBTiles store
    Terrain {
        #[arg(default_value = "data/terrain.mbtiles")]
        output: PathBuf,
    },
    /// Build contour lines and package them as vector tiles
    ///
    /// An output ending in `.geojsonl` writes the merged feature feed only.
    Contours {
        #[arg(default_value = "data/contours.mbtiles")]
        output: PathBuf,

        /// Contour extraction backend
        #[arg(long, value_enum)]
        engine: Option<ContourEngine>,

        /// Directory for per-cell fragments
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Json => builder.with_thread_ids(true).json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn init_metrics(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    metrics::describe_counter!("tiles_stored_total", "Work items fetched and persisted");
    metrics::describe_counter!("tiles_skipped_total", "Work items already in the output");
    metrics::describe_counter!("tiles_empty_total", "Work items with no data at the source");
    metrics::describe_counter!("tiles_failed_total", "Work items that failed after retries");

    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

impl Args {
    /// Merge command-line overrides into the loaded configuration.
    fn apply(&self, config: &mut RunConfig) {
        if let Some(bbox) = self.bbox {
            config.bbox = bbox;
        }
        if let Some(retries) = self.max_retries {
            config.retry.max_retries = retries;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }

        match &self.command {
            Command::Terrain { .. } => {
                if let Some(z) = self.min_zoom {
                    config.terrain.min_zoom = z;
                }
                if let Some(z) = self.max_zoom {
                    config.terrain.max_zoom = z;
                }
                if let Some(n) = self.concurrency {
                    config.terrain.concurrency = n;
                }
            }
            Command::Contours {
                engine, work_dir, ..
            } => {
                if let Some(z) = self.min_zoom {
                    config.contours.min_zoom = z;
                }
                if let Some(z) = self.max_zoom {
                    config.contours.max_zoom = z;
                }
                if let Some(n) = self.concurrency {
                    config.contours.concurrency = n;
                }
                if let Some(engine) = engine {
                    config.contours.engine = *engine;
                }
                if let Some(dir) = work_dir {
                    config.contours.work_dir = dir.clone();
                }
            }
        }
    }
}

/// Cancel the run on the first Ctrl+C.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, finishing in-flight work");
            cancel.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    if let Some(addr) = args.metrics_addr {
        init_metrics(addr)?;
    }

    let mut config = RunConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match &args.command {
        Command::Terrain { output } => commands::terrain(&config, output, cancel).await,
        Command::Contours { output, .. } => commands::contours(&config, output, cancel).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_terrain_defaults() {
        let args = Args::try_parse_from(["tile-fetcher", "terrain"]).unwrap();
        match args.command {
            Command::Terrain { output } => {
                assert_eq!(output, PathBuf::from("data/terrain.mbtiles"))
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides_apply_to_selected_command() {
        let args = Args::try_parse_from([
            "tile-fetcher",
            "contours",
            "out.geojsonl",
            "--bbox",
            "-1.5,50,1,51",
            "--min-zoom",
            "10",
            "--concurrency",
            "2",
            "--engine",
            "gdal",
        ])
        .unwrap();

        let mut config = RunConfig::default();
        let terrain_before = config.terrain.clone();
        args.apply(&mut config);

        assert_eq!(config.bbox, BoundingBox::new(-1.5, 50.0, 1.0, 51.0).unwrap());
        assert_eq!(config.contours.min_zoom, 10);
        assert_eq!(config.contours.concurrency, 2);
        assert_eq!(config.contours.engine, ContourEngine::Gdal);
        assert_eq!(config.terrain.min_zoom, terrain_before.min_zoom);
        assert_eq!(config.terrain.concurrency, terrain_before.concurrency);
    }

    #[test]
    fn test_invalid_bbox_is_rejected() {
        let result = Args::try_parse_from(["tile-fetcher", "terrain", "--bbox", "5,5,1,1"]);
        assert!(result.is_err());
    }
}
