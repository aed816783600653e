//! Persistence targets for worker outcomes.
//!
//! A sink is written only by the coordinator, so it takes `&mut self` and
//! needs no internal locking.

mod geojson;
mod mbtiles;

pub use geojson::GeoJsonMergeSink;
pub use mbtiles::{MbtilesMetadata, MbtilesSink, StoredTile, DEFAULT_BATCH_SIZE};

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::existing::ExistingSet;
use crate::key::WorkKey;
use crate::worker::Outcome;

/// Summary of what a sink persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// Records written by this run.
    pub written: u64,
    /// Where the output lives (file path or `:memory:`).
    pub location: String,
}

#[async_trait]
pub trait Sink: Send {
    type Key: WorkKey;
    type Output: Send + 'static;

    /// Keys already durably stored for `level`, loaded in one query.
    async fn load_existing(
        &mut self,
        level: u8,
    ) -> PipelineResult<ExistingSet<<Self::Key as WorkKey>::Stored>>;

    /// Take one outcome. Only `Stored` outcomes are persisted.
    async fn accept(&mut self, key: &Self::Key, outcome: Outcome<Self::Output>)
        -> PipelineResult<()>;

    /// Make everything accepted for `level` durable.
    async fn end_level(&mut self, level: u8) -> PipelineResult<()>;

    async fn finish(&mut self) -> PipelineResult<SinkReport>;
}
