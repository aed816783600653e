//! The `terrain` and `contours` runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tile_pipeline::{
    enumerate_cells, plan_cells, plan_tiles, require_tools, total_tiles, BuiltinTransformer,
    CancellationToken, ContourWorker, Fetcher, GdalContourTransformer, GeoJsonMergeSink,
    HttpSource, MbtilesMetadata, MbtilesSink, Packager, Pipeline, PipelineConfig, RetryConfig,
    RunSummary, SourceCache, TileDownloadWorker, Transformer,
};
use tracing::info;

use crate::config::{ContourEngine, RunConfig};

const FEED_EXTENSION: &str = "geojsonl";

fn fetcher(config: &RunConfig, template: &str, cache_subdir: &str) -> Result<Fetcher> {
    let source = HttpSource::new(config.request_timeout())?;
    let cache = config
        .cache_dir
        .as_ref()
        .map(|dir| SourceCache::new(dir.join(cache_subdir)));

    Ok(Fetcher::new(Arc::new(source), template)
        .with_retry(RetryConfig::from(&config.retry))
        .with_cache(cache))
}

fn log_summary(summary: &RunSummary) {
    info!(
        stored = summary.stored,
        skipped = summary.skipped,
        empty = summary.empty,
        failed = summary.failed,
        total = summary.total,
        written = summary.sink.written,
        location = %summary.sink.location,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        cancelled = summary.cancelled,
        "Run summary"
    );
}

/// Log the summary and turn an unusable run into an error. Interruption is
/// reported ahead of empty output.
fn conclude(summary: &RunSummary) -> Result<()> {
    log_summary(summary);
    summary.ensure_complete()?;
    summary.ensure_output()?;
    Ok(())
}

/// Download terrain tiles into `output`.
pub async fn terrain(config: &RunConfig, output: &Path, cancel: CancellationToken) -> Result<()> {
    let zooms = config.terrain_zooms()?;
    let terrain = &config.terrain;

    info!(
        bbox = %config.bbox,
        min_zoom = zooms.min,
        max_zoom = zooms.max,
        tiles = total_tiles(&config.bbox, zooms),
        output = %output.display(),
        "Building terrain tileset"
    );

    let metadata = MbtilesMetadata {
        name: terrain.name.clone(),
        description: terrain.description.clone(),
        attribution: config.attribution.clone(),
        format: terrain.format.clone(),
        bounds: config.bbox,
        zooms,
    };
    let mut sink = MbtilesSink::open(output, &metadata, terrain.batch_size)
        .await
        .with_context(|| format!("Failed to open {}", output.display()))?;

    let worker = TileDownloadWorker::new(fetcher(config, &terrain.url_template, "terrain")?);
    let pipeline = Pipeline::new(
        worker,
        PipelineConfig::download().with_concurrency(terrain.concurrency),
    );

    let summary = pipeline
        .run(plan_tiles(&config.bbox, zooms), &mut sink, cancel)
        .await?;
    sink.close().await;

    conclude(&summary)
}

/// True when `output` asks for the merged feed rather than vector tiles.
fn wants_feed_only(output: &Path) -> bool {
    output.extension().is_some_and(|ext| ext == FEED_EXTENSION)
}

fn transformer(config: &RunConfig) -> Arc<dyn Transformer> {
    let params = config.contours.params();
    match config.contours.engine {
        ContourEngine::Builtin => Arc::new(BuiltinTransformer::new(params)),
        ContourEngine::Gdal => Arc::new(GdalContourTransformer::new(params)),
    }
}

/// Build contours into `output`, packaging unless it is a `.geojsonl` feed.
pub async fn contours(config: &RunConfig, output: &Path, cancel: CancellationToken) -> Result<()> {
    let zooms = config.contour_zooms()?;
    let contours = &config.contours;
    let transformer = transformer(config);

    let package = !wants_feed_only(output);
    let packager = Packager::tippecanoe();

    let mut tools = transformer.required_tools();
    if package {
        tools.push(Packager::TIPPECANOE.to_string());
    }
    require_tools(&tools)?;

    let feed: PathBuf = if package {
        output.with_extension(FEED_EXTENSION)
    } else {
        output.to_path_buf()
    };

    info!(
        bbox = %config.bbox,
        engine = transformer.name(),
        interval = contours.interval,
        work_dir = %contours.work_dir.display(),
        output = %output.display(),
        "Building contour tileset"
    );

    let mut sink = GeoJsonMergeSink::new(&contours.work_dir, &feed)
        .await?
        .with_cells(enumerate_cells(&config.bbox));
    let worker = ContourWorker::new(fetcher(config, &contours.url_template, "hgt")?, transformer);
    let pipeline = Pipeline::new(
        worker,
        PipelineConfig::transform().with_concurrency(contours.concurrency),
    );

    let summary = pipeline
        .run(plan_cells(&config.bbox), &mut sink, cancel)
        .await?;

    conclude(&summary)?;

    if package {
        packager.package(&feed, output, zooms).await?;
    }
    Ok(())
}
