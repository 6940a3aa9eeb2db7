//! Downloader configuration
//!
//! Retry policy for page fetches and the size of the event channel. Values
//! come from the `[worker]` table of the config file or from
//! [`WorkerConfigBuilder`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for the download worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum retry attempts per page
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff)
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// Maximum retry delay (backoff cap)
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    /// Exponential backoff multiplier for retries
    pub retry_backoff_multiplier: u32,
    /// Buffer size of the event broadcast channel
    pub event_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: workers::MAX_RETRIES,
            retry_base_delay: workers::RETRY_BASE_DELAY,
            retry_max_delay: workers::RETRY_MAX_DELAY,
            retry_backoff_multiplier: workers::RETRY_BACKOFF_MULTIPLIER,
            event_buffer_size: workers::EVENT_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> DownloadResult<()> {
        if self.retry_base_delay > self.retry_max_delay {
            return Err(DownloadError::ConfigurationError(
                "Retry base delay must not exceed max delay".to_string(),
            ));
        }

        if self.retry_backoff_multiplier == 0 {
            return Err(DownloadError::ConfigurationError(
                "Retry backoff multiplier must be at least 1".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(DownloadError::ConfigurationError(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for WorkerConfig
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.config.retry_max_delay = delay;
        self
    }

    pub fn retry_backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.config.retry_backoff_multiplier = multiplier;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> DownloadResult<WorkerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
