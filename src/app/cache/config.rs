//! Download cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::cache;

/// Configuration for the download cache, the `[cache]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a read rebuilds the index from disk
    #[serde(with = "humantime_serde")]
    pub renew_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            renew_interval: cache::RENEW_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Set the renew interval
    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }
}
