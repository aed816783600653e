//! Runtime knobs for the pipeline.

use std::time::Duration;

/// Retry policy for transient fetch failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; grows linearly with the attempt number.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Retry immediately, for tests and local sources.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Concurrency and reporting settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub report_interval: Duration,
}

impl PipelineConfig {
    /// Settings for network-bound downloads.
    pub fn download() -> Self {
        Self {
            concurrency: default_download_concurrency(),
            report_interval: default_report_interval(),
        }
    }

    /// Settings for CPU-bound transforms.
    pub fn transform() -> Self {
        Self {
            concurrency: default_transform_concurrency(),
            report_interval: default_report_interval(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

pub fn default_download_concurrency() -> usize {
    30
}

/// One worker per available core.
pub fn default_transform_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

pub fn default_report_interval() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for(3), Duration::from_millis(1500));
        assert_eq!(config.delay_for(100), Duration::from_secs(10));
    }

    #[test]
    fn test_concurrency_floor() {
        assert_eq!(PipelineConfig::download().with_concurrency(0).concurrency, 1);
        assert!(default_transform_concurrency() >= 1);
    }
}
