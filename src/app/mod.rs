//! Core application logic for Manga Fetcher
//!
//! - [`download`]: the [`DownloadManager`] facade, download jobs, on-disk
//!   layout, queue persistence and deferred deletion
//! - [`queue`], [`worker`], [`cache`]: the pieces the manager coordinates
//! - [`loader`] and [`reader`]: turning a chapter into pages for display
//! - [`source`] and [`client`]: catalog backends and their HTTP plumbing
//! - [`models`], [`page`], [`observe`], [`naming`], [`image`]: shared types
//!   and helpers
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use manga_fetcher::app::{
//!     CacheConfig, DownloadManager, DownloadPreferences, InMemorySourceManager, WorkerConfig,
//! };
//! use manga_fetcher::app::models::{Chapter, Manga};
//!
//! # async fn example() -> manga_fetcher::Result<()> {
//! let sources = Arc::new(InMemorySourceManager::new());
//! let manager = DownloadManager::new(
//!     DownloadPreferences::with_root("/srv/manga"),
//!     WorkerConfig::default(),
//!     CacheConfig::default(),
//!     sources,
//! )?;
//!
//! let manga = Manga::new(1, 100, "/manga/1", "Some Manga");
//! let chapters = vec![Chapter::new(10, 1, "/chapter/10", "Chapter 1")];
//! manager.download_chapters(&manga, &chapters, true).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod download;
pub mod image;
pub mod loader;
pub mod models;
pub mod naming;
pub mod observe;
pub mod page;
pub mod queue;
pub mod reader;
pub mod source;
pub mod worker;

// Re-export main public API
pub use cache::{CacheConfig, DownloadCache};
pub use client::{ClientConfig, HttpHandler};
pub use download::{
    Download, DownloadManager, DownloadPreferences, DownloadProvider, DownloadStatus,
};
pub use loader::{ChapterLoader, PageLoader};
pub use models::{Chapter, ChapterInfo, Manga};
pub use page::{Page, PageStatus, PageStream};
pub use queue::{DownloadListener, DownloadQueue};
pub use reader::{ChapterState, ReaderChapter};
pub use source::{
    ChapterRepository, HttpSource, InMemoryLibrary, InMemorySourceManager, LocalSource, Source,
    SourceManager,
};
pub use worker::{Downloader, DownloaderEvent, WorkerConfig};
