//! Retry timing and per-chapter outcome figures

use std::time::Duration;

/// Backoff calculation utilities
pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Calculate retry delay with exponential backoff
    ///
    /// `base * multiplier^retry_count`, capped at `max_delay`.
    pub fn calculate_retry_delay(
        retry_count: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Duration {
        let delay_millis = base_delay.as_millis() as u64;
        let factor = (multiplier as u64).saturating_pow(retry_count);
        let multiplied_delay = delay_millis.saturating_mul(factor);
        let capped_delay = std::cmp::min(multiplied_delay, max_delay.as_millis() as u64);
        Duration::from_millis(capped_delay)
    }
}

/// What happened to the pages of one chapter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChapterOutcome {
    /// Pages fetched during this run
    pub fetched: usize,
    /// Pages already on disk from an earlier run
    pub reused: usize,
    /// Pages that failed after all retries
    pub failed: usize,
    /// Pages not attempted because the worker was paused
    pub skipped: usize,
}

impl ChapterOutcome {
    pub fn ready(&self) -> usize {
        self.fetched + self.reused
    }
}
