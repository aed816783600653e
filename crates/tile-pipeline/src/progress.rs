//! Run counters, throughput and ETA.
//!
//! The hot path only bumps atomics; a background task logs a snapshot on a
//! fixed interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::info;

/// Shared counters for one run.
#[derive(Debug)]
pub struct RunStats {
    stored: AtomicU64,
    skipped: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    total: AtomicU64,
    started: Instant,
}

/// Cheap handle to the run counters.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    stats: Arc<RunStats>,
}

impl ProgressReporter {
    pub fn new(total: u64) -> Self {
        Self {
            stats: Arc::new(RunStats {
                stored: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                empty: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                total: AtomicU64::new(total),
                started: Instant::now(),
            }),
        }
    }

    pub fn record_stored(&self) {
        self.stats.stored.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tiles_stored_total").increment(1);
    }

    pub fn record_skipped(&self) {
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tiles_skipped_total").increment(1);
    }

    pub fn record_empty(&self) {
        self.stats.empty.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tiles_empty_total").increment(1);
    }

    pub fn record_failed(&self) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tiles_failed_total").increment(1);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stored: self.stats.stored.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            empty: self.stats.empty.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            total: self.stats.total.load(Ordering::Relaxed),
            elapsed: self.stats.started.elapsed(),
        }
    }

    /// Log a snapshot every `every` until the returned handle is aborted.
    pub fn spawn_logger(&self, every: Duration) -> JoinHandle<()> {
        let reporter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(100)));
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                reporter.snapshot().log("Progress");
            }
        })
    }
}

/// Point-in-time view of the run counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub stored: u64,
    pub skipped: u64,
    pub empty: u64,
    pub failed: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Items with a final outcome, including skips.
    pub fn done(&self) -> u64 {
        self.stored + self.skipped + self.empty + self.failed
    }

    /// Items actually processed this run (skips excluded).
    pub fn active(&self) -> u64 {
        self.stored + self.empty + self.failed
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.done())
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.done() as f64 / self.total as f64 * 100.0
        }
    }

    /// Processed items per second; skips are not throughput.
    pub fn rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        let active = self.active();
        if secs <= 0.0 || active == 0 {
            None
        } else {
            Some(active as f64 / secs)
        }
    }

    /// Estimated time to finish the remaining items.
    pub fn eta(&self) -> Option<Duration> {
        self.rate()
            .map(|rate| Duration::from_secs_f64(self.remaining() as f64 / rate))
    }

    pub fn log(&self, message: &'static str) {
        info!(
            stored = self.stored,
            skipped = self.skipped,
            empty = self.empty,
            failed = self.failed,
            total = self.total,
            percent = %format!("{:.1}", self.percent()),
            rate = %format!("{:.1}/s", self.rate().unwrap_or(0.0)),
            eta_secs = self.eta().map(|d| d.as_secs()),
            "{}",
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(stored: u64, skipped: u64, elapsed: Duration) -> ProgressSnapshot {
        ProgressSnapshot {
            stored,
            skipped,
            empty: 0,
            failed: 0,
            total: 100,
            elapsed,
        }
    }

    #[test]
    fn test_eta_none_at_zero_elapsed() {
        assert_eq!(snapshot(10, 0, Duration::ZERO).eta(), None);
    }

    #[test]
    fn test_eta_none_for_pure_resume() {
        assert_eq!(snapshot(0, 50, Duration::from_secs(5)).eta(), None);
    }

    #[test]
    fn test_eta_excludes_skips_from_rate() {
        // 20 processed in 10s => 2/s; 100 - 60 done = 40 remaining => 20s.
        let s = snapshot(20, 40, Duration::from_secs(10));
        assert_eq!(s.rate(), Some(2.0));
        assert_eq!(s.eta(), Some(Duration::from_secs(20)));
        assert_eq!(s.percent(), 60.0);
    }

    #[test]
    fn test_reporter_counts() {
        let reporter = ProgressReporter::new(5);
        reporter.record_stored();
        reporter.record_stored();
        reporter.record_skipped();
        reporter.record_empty();
        reporter.record_failed();

        let s = reporter.snapshot();
        assert_eq!((s.stored, s.skipped, s.empty, s.failed), (2, 1, 1, 1));
        assert_eq!(s.remaining(), 0);
        assert_eq!(s.percent(), 100.0);
    }
}
