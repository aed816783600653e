//! Bounded-concurrency worker pool over a lazy item stream.

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::worker::{Outcome, Worker};

/// Process `items` with at most `concurrency` workers in flight.
///
/// Completions are yielded as they finish, in no particular order. Every
/// dispatched item yields exactly one outcome; a panicking worker becomes
/// [`Outcome::Failed`]. Once `cancel` fires no new items are dispatched, and
/// the stream ends after the in-flight items drain.
pub fn run_pool<W, I>(
    items: I,
    worker: Arc<W>,
    concurrency: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = (W::Key, Outcome<W::Output>)> + Send
where
    W: Worker,
    I: Iterator<Item = W::Key> + Send,
{
    stream::iter(items)
        .take_until(cancel.cancelled_owned())
        .map(move |key| {
            let worker = worker.clone();
            async move {
                let task_key = key.clone();
                let handle = tokio::spawn(async move { worker.process(&task_key).await });
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Outcome::Failed(WorkerError::Panicked(e.to_string())),
                };
                (key, outcome)
            }
        })
        .buffer_unordered(concurrency.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tile_common::TileCoord;

    use crate::worker::EmptyReason;

    /// Sleeps briefly and tracks peak concurrency.
    #[derive(Default)]
    struct ProbeWorker {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        processed: AtomicUsize,
    }

    #[async_trait]
    impl Worker for ProbeWorker {
        type Key = TileCoord;
        type Output = u32;

        async fn process(&self, tile: &TileCoord) -> Outcome<u32> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.processed.fetch_add(1, Ordering::SeqCst);

            match tile.x {
                0 => Outcome::Empty(EmptyReason::NotFound),
                1 => panic!("worker blew up on {tile}"),
                x => Outcome::Stored(x),
            }
        }
    }

    fn tiles(n: u32) -> impl Iterator<Item = TileCoord> + Send {
        (0..n).map(|x| TileCoord::new(12, x, 7))
    }

    #[tokio::test]
    async fn test_every_item_yields_one_outcome() {
        let worker = Arc::new(ProbeWorker::default());
        let results: Vec<_> = run_pool(tiles(20), worker.clone(), 4, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(results.len(), 20);
        assert!(worker.peak.load(Ordering::SeqCst) <= 4);

        let stored = results.iter().filter(|(_, o)| o.is_stored()).count();
        let empty = results.iter().filter(|(_, o)| o.is_empty()).count();
        assert_eq!((stored, empty), (18, 1));

        let (_, panicked) = results.iter().find(|(tile, _)| tile.x == 1).unwrap();
        assert!(matches!(panicked, Outcome::Failed(WorkerError::Panicked(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let worker = Arc::new(ProbeWorker::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results: Vec<_> = run_pool(tiles(10), worker.clone(), 2, cancel).collect().await;
        assert!(results.is_empty());
        assert_eq!(worker.processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_midway_drains_in_flight() {
        let worker = Arc::new(ProbeWorker::default());
        let cancel = CancellationToken::new();

        let mut outcomes = Box::pin(run_pool(tiles(100), worker.clone(), 3, cancel.clone()));
        let mut seen = 0;
        while outcomes.next().await.is_some() {
            seen += 1;
            if seen == 5 {
                cancel.cancel();
            }
        }

        assert!(seen < 100);
        assert_eq!(seen, worker.processed.load(Ordering::SeqCst));
    }
}
