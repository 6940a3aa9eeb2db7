//! Configuration management for Manga Fetcher
//!
//! One TOML file configures every subsystem. Each table deserializes
//! straight into the runtime configuration of its subsystem; missing tables
//! and keys fall back to defaults, so an empty file is a valid
//! configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::client::ClientConfig;
use crate::app::download::DownloadPreferences;
use crate::app::worker::WorkerConfig;
use crate::constants::{config, limits, workers};
use crate::errors::{ConfigError, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Download location and behaviour
    pub downloads: DownloadPreferences,
    /// Download cache settings
    pub cache: CacheConfig,
    /// Download worker retry settings
    pub worker: WorkerConfig,
    /// HTTP client settings
    pub client: ClientConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config_file_override`, or from the first
    /// standard location that exists, or use defaults
    ///
    /// # Errors
    ///
    /// `ConfigError::NotFound` if an explicit file does not exist, and any
    /// read, parse or validation error of the file that was found.
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file().await,
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found in standard locations");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values that deserialization alone cannot
    pub fn validate(&self) -> Result<()> {
        self.downloads.validate()?;
        self.worker.validate()?;
        if self.client.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "Must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Write a commented default configuration if none exists yet
    pub async fn initialize_first_run() -> Result<Option<PathBuf>> {
        let Some(config_path) = Self::get_default_config_path() else {
            return Ok(None);
        };
        if tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
            return Ok(Some(config_path));
        }

        info!("Creating default configuration file...");
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&config_path, Self::generate_default_config_content()).await?;
        info!("Created default configuration at {}", config_path.display());
        Ok(Some(config_path))
    }

    /// Find configuration file in standard locations
    async fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(format!("./{}", config::LOCAL_CONFIG_FILE))];
        search_paths.extend(Self::get_default_config_path());

        for path in search_paths {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }
        None
    }

    /// Default config file path for the current user
    fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(config::APP_DIR_NAME).join(config::CONFIG_FILE))
    }

    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConfigError::Io)?;
        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::InvalidFormat)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    fn generate_default_config_content() -> String {
        format!(
            r#"# Manga Fetcher configuration
# Every key is optional; remove a line to use its default.

[downloads]
# download_root = "/path/to/downloads"
save_chapters_as_cbz = false
remove_bookmarked_chapters = false
page_concurrency = {}

[cache]
renew_interval = "1h"

[worker]
max_retries = {}
retry_base_delay = "1s"
retry_max_delay = "30s"
retry_backoff_multiplier = 2

[client]
request_timeout = "60s"
connect_timeout = "30s"
rate_limit_rps = {}

[logging]
level = "info"  # error, warn, info, debug, trace
"#,
            workers::DEFAULT_PAGE_CONCURRENCY,
            workers::MAX_RETRIES,
            limits::DEFAULT_RATE_LIMIT_RPS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_content_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::generate_default_config_content()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.downloads.page_concurrency, workers::DEFAULT_PAGE_CONCURRENCY);
        assert_eq!(config.cache.renew_interval, Duration::from_secs(3600));
        assert_eq!(config.worker.retry_max_delay, Duration::from_secs(30));
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [downloads]
            download_root = "/srv/manga"
            save_chapters_as_cbz = true

            [cache]
            renew_interval = "5m"
            "#,
        )
        .unwrap();

        let config = AppConfig::load(Some(path)).await.unwrap();
        assert!(config.downloads.save_chapters_as_cbz);
        assert_eq!(config.downloads.root(), PathBuf::from("/srv/manga"));
        assert_eq!(config.cache.renew_interval, Duration::from_secs(300));
        assert_eq!(config.worker.max_retries, workers::MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_missing_explicit_file() {
        let temp = TempDir::new().unwrap();
        let result = AppConfig::load(Some(temp.path().join("nope.toml"))).await;
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        std::fs::write(&path, "[downloads]\npage_concurrency = 0\n").unwrap();
        assert!(AppConfig::load(Some(path.clone())).await.is_err());

        std::fs::write(&path, "[downloads\n").unwrap();
        assert!(matches!(
            AppConfig::load(Some(path)).await,
            Err(AppError::Config(ConfigError::InvalidFormat(_)))
        ));
    }
}
