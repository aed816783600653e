//! Resumable tile-grid batch processing.
//!
//! A run enumerates the work keys covering a bounding box (tiles per zoom,
//! or 1° elevation cells), skips keys the sink already holds, fetches and
//! optionally transforms the rest on a bounded worker pool, and persists
//! outcomes through a single-writer [`Sink`].
//!
//! ```text
//! plan_tiles / plan_cells ──▶ ExistingSet::filter ──▶ run_pool(Worker×N) ──▶ Sink
//!                                                          │
//!                                                  ProgressReporter
//! ```

pub mod cache;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod existing;
pub mod key;
pub mod package;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod run;
pub mod sink;
pub mod source;
pub mod transform;
pub mod worker;

pub use cache::SourceCache;
pub use config::{PipelineConfig, RetryConfig};
pub use enumerate::{enumerate_cells, enumerate_tiles, plan_cells, plan_tiles, total_tiles, LevelPlan};
pub use error::{FetchError, PipelineError, PipelineResult, TransformError, WorkerError};
pub use existing::ExistingSet;
pub use key::WorkKey;
pub use package::{require_tools, Packager};
pub use pool::run_pool;
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use retry::{fetch_with_retry, IsRetryable};
pub use run::{Pipeline, RunSummary};
pub use sink::{GeoJsonMergeSink, MbtilesMetadata, MbtilesSink, Sink, SinkReport};
pub use source::{HttpSource, TileSource};
pub use transform::{BuiltinTransformer, GdalContourTransformer, Transformer};
pub use worker::{
    ContourWorker, EmptyReason, Fetcher, Outcome, TileDownloadWorker, TileRecord, Worker,
};

pub use tokio_util::sync::CancellationToken;
