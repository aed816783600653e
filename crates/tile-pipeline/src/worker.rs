//! Workers: fetch (and optionally transform) one work item.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use contour::ContourFeature;
use tile_common::{DemCell, TileCoord};
use tracing::{debug, warn};

use crate::cache::SourceCache;
use crate::config::RetryConfig;
use crate::error::{FetchError, WorkerError};
use crate::key::WorkKey;
use crate::retry::fetch_with_retry;
use crate::source::TileSource;
use crate::transform::Transformer;

/// Result of processing one work item.
#[derive(Debug)]
pub enum Outcome<T> {
    Stored(T),
    Empty(EmptyReason),
    Failed(WorkerError),
}

impl<T> Outcome<T> {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Why an item legitimately produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    /// The source has no data for this key.
    NotFound,
    /// The source answered with an empty body.
    NoData,
    /// The raster decoded but yielded no features.
    NoFeatures,
    /// The transform failed; isolated to this item.
    TransformFailed(String),
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::NoData => f.write_str("empty payload"),
            Self::NoFeatures => f.write_str("no features"),
            Self::TransformFailed(e) => write!(f, "transform failed: {e}"),
        }
    }
}

/// Processes one key into an [`Outcome`].
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    type Key: WorkKey;
    type Output: Send + 'static;

    async fn process(&self, key: &Self::Key) -> Outcome<Self::Output>;
}

/// Fetches raw bytes for a key: cache first, then the source with retries.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn TileSource>,
    template: String,
    retry: RetryConfig,
    cache: Option<SourceCache>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn TileSource>, template: impl Into<String>) -> Self {
        Self {
            source,
            template: template.into(),
            retry: RetryConfig::default(),
            cache: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: Option<SourceCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub async fn fetch<K: WorkKey>(&self, key: &K) -> Result<Bytes, FetchError> {
        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.read(key).await {
                debug!(key = %key, "Cache hit");
                return Ok(bytes);
            }
        }

        let url = key.render_url(&self.template);
        let bytes = fetch_with_retry(&self.retry, || self.source.fetch(&url)).await?;

        if let Some(cache) = &self.cache {
            if !bytes.is_empty() {
                if let Err(e) = cache.write(key, &bytes).await {
                    warn!(key = %key, error = %e, "Failed to write cache entry");
                }
            }
        }

        Ok(bytes)
    }
}

/// Classify a fetch result that did not yield bytes.
fn fetch_failure<T>(error: FetchError) -> Outcome<T> {
    if error.is_not_found() {
        Outcome::Empty(EmptyReason::NotFound)
    } else {
        Outcome::Failed(WorkerError::Fetch(error))
    }
}

/// A downloaded tile ready for the MBTiles store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRecord {
    pub zoom: u8,
    pub column: u32,
    /// TMS row (flipped).
    pub row: u32,
    pub data: Bytes,
}

impl TileRecord {
    pub fn new(tile: &TileCoord, data: Bytes) -> Self {
        Self {
            zoom: tile.z,
            column: tile.x,
            row: tile.storage_row(),
            data,
        }
    }
}

/// Downloads pre-rendered tiles as-is.
pub struct TileDownloadWorker {
    fetcher: Fetcher,
}

impl TileDownloadWorker {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Worker for TileDownloadWorker {
    type Key = TileCoord;
    type Output = TileRecord;

    async fn process(&self, tile: &TileCoord) -> Outcome<TileRecord> {
        match self.fetcher.fetch(tile).await {
            Ok(data) if data.is_empty() => Outcome::Empty(EmptyReason::NoData),
            Ok(data) => Outcome::Stored(TileRecord::new(tile, data)),
            Err(e) => fetch_failure(e),
        }
    }
}

/// Downloads an elevation archive per cell and extracts contour features.
pub struct ContourWorker {
    fetcher: Fetcher,
    transformer: Arc<dyn Transformer>,
}

impl ContourWorker {
    pub fn new(fetcher: Fetcher, transformer: Arc<dyn Transformer>) -> Self {
        Self {
            fetcher,
            transformer,
        }
    }
}

#[async_trait]
impl Worker for ContourWorker {
    type Key = DemCell;
    type Output = Vec<ContourFeature>;

    async fn process(&self, cell: &DemCell) -> Outcome<Vec<ContourFeature>> {
        let raster = match self.fetcher.fetch(cell).await {
            Ok(raster) if raster.is_empty() => return Outcome::Empty(EmptyReason::NoData),
            Ok(raster) => raster,
            Err(e) => return fetch_failure(e),
        };

        match self.transformer.extract_features(cell, raster).await {
            Ok(features) if features.is_empty() => Outcome::Empty(EmptyReason::NoFeatures),
            Ok(features) => {
                debug!(cell = %cell, features = features.len(), "Extracted contours");
                Outcome::Stored(features)
            }
            Err(e) => {
                warn!(
                    cell = %cell,
                    transformer = self.transformer.name(),
                    error = %e,
                    "Contour extraction failed"
                );
                Outcome::Empty(EmptyReason::TransformFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed responses and counts calls.
    struct FixedSource {
        status: Option<u16>,
        body: &'static [u8],
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn ok(body: &'static [u8]) -> Arc<Self> {
            Arc::new(Self {
                status: None,
                body,
                calls: AtomicUsize::new(0),
            })
        }

        fn status(code: u16) -> Arc<Self> {
            Arc::new(Self {
                status: Some(code),
                body: b"",
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TileSource for FixedSource {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                None => Ok(Bytes::from_static(self.body)),
                Some(404) => Err(FetchError::NotFound {
                    url: url.to_string(),
                }),
                Some(status) => Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                }),
            }
        }
    }

    fn worker(source: Arc<FixedSource>) -> TileDownloadWorker {
        let fetcher = Fetcher::new(source, "stub://{z}/{x}/{y}").with_retry(RetryConfig::immediate(2));
        TileDownloadWorker::new(fetcher)
    }

    #[tokio::test]
    async fn test_download_flips_row() {
        let source = FixedSource::ok(b"png");
        let outcome = worker(source).process(&TileCoord::new(1, 0, 0)).await;
        match outcome {
            Outcome::Stored(record) => {
                assert_eq!((record.zoom, record.column, record.row), (1, 0, 1));
                assert_eq!(record.data, Bytes::from_static(b"png"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_empty_without_retry() {
        let source = FixedSource::status(404);
        let outcome = worker(source.clone()).process(&TileCoord::new(8, 131, 76)).await;
        assert!(matches!(outcome, Outcome::Empty(EmptyReason::NotFound)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_fails_after_retries() {
        let source = FixedSource::status(503);
        let outcome = worker(source.clone()).process(&TileCoord::new(8, 131, 76)).await;
        assert!(outcome.is_failed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_immediately() {
        let source = FixedSource::status(403);
        let outcome = worker(source.clone()).process(&TileCoord::new(8, 131, 76)).await;
        assert!(outcome.is_failed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_body_is_empty() {
        let source = FixedSource::ok(b"");
        let outcome = worker(source).process(&TileCoord::new(0, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Empty(EmptyReason::NoData)));
    }

    #[tokio::test]
    async fn test_cache_short_circuits_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource::ok(b"png");
        let fetcher = Fetcher::new(source.clone(), "stub://{z}/{x}/{y}")
            .with_cache(Some(SourceCache::new(dir.path())));
        let worker = TileDownloadWorker::new(fetcher);
        let tile = TileCoord::new(2, 1, 1);

        assert!(worker.process(&tile).await.is_stored());
        assert!(worker.process(&tile).await.is_stored());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
