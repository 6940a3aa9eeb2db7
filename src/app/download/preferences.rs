//! User preferences read by the download subsystem
//!
//! These are consumed at decision points and never written back.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{config, files, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Download behaviour settings, the `[downloads]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadPreferences {
    /// Root of `<source>/<manga>/<chapter>` (OS data directory if None)
    pub download_root: Option<PathBuf>,
    /// Store finished chapters as a single `.cbz` archive
    pub save_chapters_as_cbz: bool,
    /// Allow deleting bookmarked chapters
    pub remove_bookmarked_chapters: bool,
    /// Pages fetched concurrently within one chapter
    pub page_concurrency: usize,
    /// Queue persistence file, relative paths resolve against the download root
    pub queue_file: PathBuf,
    /// Pending deletion file, relative paths resolve against the download root
    pub pending_delete_file: PathBuf,
}

impl Default for DownloadPreferences {
    fn default() -> Self {
        Self {
            download_root: None,
            save_chapters_as_cbz: false,
            remove_bookmarked_chapters: false,
            page_concurrency: workers::DEFAULT_PAGE_CONCURRENCY,
            queue_file: PathBuf::from(files::QUEUE_FILE_NAME),
            pending_delete_file: PathBuf::from(files::PENDING_DELETE_FILE_NAME),
        }
    }
}

impl DownloadPreferences {
    /// Preferences rooted at a specific directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: Some(root.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_concurrency == 0 || self.page_concurrency > workers::MAX_PAGE_CONCURRENCY {
            return Err(ConfigError::InvalidValue {
                field: "downloads.page_concurrency".to_string(),
                value: self.page_concurrency.to_string(),
                reason: format!("Must be between 1 and {}", workers::MAX_PAGE_CONCURRENCY),
            });
        }
        Ok(())
    }

    /// Resolved download root
    ///
    /// Falls back to `<data dir>/manga-fetcher/downloads`, or `./downloads`
    /// when the platform has no data directory.
    pub fn root(&self) -> PathBuf {
        match &self.download_root {
            Some(root) => root.clone(),
            None => dirs::data_dir()
                .map(|dir| dir.join(config::APP_DIR_NAME).join(config::DOWNLOADS_DIR))
                .unwrap_or_else(|| PathBuf::from(config::DOWNLOADS_DIR)),
        }
    }

    pub fn queue_path(&self) -> PathBuf {
        self.root().join(&self.queue_file)
    }

    pub fn pending_delete_path(&self) -> PathBuf {
        self.root().join(&self.pending_delete_file)
    }
}
