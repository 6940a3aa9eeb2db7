//! Prelude module for Manga Fetcher Library
//!
//! Re-exports the most commonly used items so that an embedding
//! application can start with a single `use manga_fetcher::prelude::*;`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use manga_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let manager = Arc::new(DownloadManager::new(
//!         config.downloads,
//!         config.worker,
//!         config.cache,
//!         Arc::new(InMemorySourceManager::new()),
//!     )?);
//!     manager.start_downloads();
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, LoaderError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    CacheConfig, Chapter, ChapterLoader, ChapterState, Download, DownloadListener,
    DownloadManager, DownloadPreferences, DownloadStatus, HttpSource, InMemorySourceManager,
    Manga, Page, PageStatus, ReaderChapter, Source, SourceManager, WorkerConfig,
};
pub use crate::config::AppConfig;

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        let _config = CacheConfig::default();
        let _worker = WorkerConfig::default();
        let chapter = ReaderChapter::new(Chapter::new(1, 1, "/c/1", "Chapter 1"));
        assert!(matches!(chapter.state(), ChapterState::Wait));
    }

    #[tokio::test]
    async fn test_prelude_integration_pattern() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(
            DownloadManager::new(
                DownloadPreferences::with_root(temp_dir.path()),
                WorkerConfig::default(),
                CacheConfig::default(),
                Arc::new(InMemorySourceManager::new()),
            )
            .unwrap(),
        );
        assert!(!manager.has_queue());
        assert!(!manager.is_running());
    }
}
