//! The coordinator: plan, skip, dispatch, persist, report.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::enumerate::LevelPlan;
use crate::error::{PipelineError, PipelineResult};
use crate::pool::run_pool;
use crate::progress::ProgressReporter;
use crate::sink::{Sink, SinkReport};
use crate::worker::{Outcome, Worker};

/// Post-run totals.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub stored: u64,
    pub skipped: u64,
    pub empty: u64,
    pub failed: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub sink: SinkReport,
}

impl RunSummary {
    /// A run is useful only if something is now in the output.
    pub fn ensure_output(&self) -> PipelineResult<()> {
        if self.stored + self.skipped == 0 {
            Err(PipelineError::NoOutput)
        } else {
            Ok(())
        }
    }

    /// Interrupted runs are an error even if they produced output.
    pub fn ensure_complete(&self) -> PipelineResult<()> {
        if self.cancelled {
            Err(PipelineError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Drives one worker over level plans into one sink.
pub struct Pipeline<W: Worker> {
    worker: Arc<W>,
    config: PipelineConfig,
}

impl<W: Worker> Pipeline<W> {
    pub fn new(worker: W, config: PipelineConfig) -> Self {
        Self {
            worker: Arc::new(worker),
            config,
        }
    }

    /// Process every plan level by level.
    ///
    /// Per level: load what the sink already has, skip it, dispatch the rest
    /// to the pool, hand each outcome to the sink, then close the level.
    /// Per-item failures are counted, never fatal.
    #[instrument(skip_all, fields(levels = plans.len(), concurrency = self.config.concurrency))]
    pub async fn run<S>(
        &self,
        plans: Vec<LevelPlan<W::Key>>,
        sink: &mut S,
        cancel: CancellationToken,
    ) -> PipelineResult<RunSummary>
    where
        S: Sink<Key = W::Key, Output = W::Output>,
    {
        let total: u64 = plans.iter().map(|p| p.total).sum();
        let progress = ProgressReporter::new(total);
        let logger = progress.spawn_logger(self.config.report_interval);

        info!(total, "Starting run");
        let result = self.run_levels(plans, sink, &progress, &cancel).await;
        logger.abort();

        result?;
        let report = sink.finish().await?;

        let snapshot = progress.snapshot();
        snapshot.log("Run finished");

        Ok(RunSummary {
            stored: snapshot.stored,
            skipped: snapshot.skipped,
            empty: snapshot.empty,
            failed: snapshot.failed,
            total: snapshot.total,
            elapsed: snapshot.elapsed,
            cancelled: cancel.is_cancelled(),
            sink: report,
        })
    }

    async fn run_levels<S>(
        &self,
        plans: Vec<LevelPlan<W::Key>>,
        sink: &mut S,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> PipelineResult<()>
    where
        S: Sink<Key = W::Key, Output = W::Output>,
    {
        for plan in plans {
            if cancel.is_cancelled() {
                break;
            }

            let level = plan.level;
            let existing = sink.load_existing(level).await?;
            info!(
                level,
                planned = plan.total,
                existing = existing.len(),
                "Processing level"
            );

            let skips = progress.clone();
            let pending = existing.filter(plan.items, move |key| {
                debug!(key = %key, "Already stored, skipping");
                skips.record_skipped();
            });

            let mut outcomes = Box::pin(run_pool(
                pending,
                self.worker.clone(),
                self.config.concurrency,
                cancel.clone(),
            ));

            while let Some((key, outcome)) = outcomes.next().await {
                match &outcome {
                    Outcome::Stored(_) => progress.record_stored(),
                    Outcome::Empty(reason) => {
                        debug!(key = %key, reason = %reason, "No data");
                        progress.record_empty();
                    }
                    Outcome::Failed(e) => {
                        warn!(key = %key, error = %e, "Work item failed");
                        progress.record_failed();
                    }
                }
                sink.accept(&key, outcome).await?;
            }

            sink.end_level(level).await?;

            if cancel.is_cancelled() {
                warn!(level, "Run cancelled, in-flight work drained");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(stored: u64, skipped: u64, cancelled: bool) -> RunSummary {
        RunSummary {
            stored,
            skipped,
            empty: 3,
            failed: 1,
            total: stored + skipped + 4,
            elapsed: Duration::from_secs(1),
            cancelled,
            sink: SinkReport {
                written: stored,
                location: ":memory:".to_string(),
            },
        }
    }

    #[test]
    fn test_zero_output_is_an_error() {
        assert!(matches!(
            summary(0, 0, false).ensure_output(),
            Err(PipelineError::NoOutput)
        ));
    }

    #[test]
    fn test_all_skipped_is_not_an_error() {
        assert!(summary(0, 12, false).ensure_output().is_ok());
        assert!(summary(5, 0, false).ensure_output().is_ok());
    }

    #[test]
    fn test_cancelled_is_incomplete() {
        assert!(matches!(
            summary(5, 0, true).ensure_complete(),
            Err(PipelineError::Interrupted)
        ));
    }
}
