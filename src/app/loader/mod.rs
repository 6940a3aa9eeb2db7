//! Chapter loading
//!
//! [`ChapterLoader`] turns a [`ReaderChapter`] into an ordered list of
//! pages. It picks one [`PageLoader`] per chapter by a fixed precedence:
//!
//! 1. a downloaded copy on disk, checked against the file system rather
//!    than the cache
//! 2. the remote source, fetching pages on demand
//! 3. the local library, by container format: directory, zip/cbz,
//!    rar/cbr or epub
//!
//! The chosen loader owns the chapter's open resources until the
//! chapter's last reference is dropped.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use manga_fetcher::app::download::DownloadManager;
//! use manga_fetcher::app::loader::ChapterLoader;
//! use manga_fetcher::app::models::{Chapter, Manga};
//! use manga_fetcher::app::reader::ReaderChapter;
//!
//! # async fn example(manager: Arc<DownloadManager>) -> Result<(), Box<dyn std::error::Error>> {
//! let manga = Manga::new(1, 0, "My Manga", "My Manga");
//! let source = manager.sources().get_or_stub(manga.source);
//! let loader = ChapterLoader::new(manager, manga, source);
//!
//! let chapter = ReaderChapter::new(Chapter::new(1, 1, "My Manga/Chapter 1", "Chapter 1"));
//! chapter.add_ref();
//! loader.load_chapter(&chapter).await?;
//! for page in chapter.pages().unwrap_or_default().iter() {
//!     println!("page {} ({} bytes)", page.number(), page.read().await?.len());
//! }
//! chapter.unref();
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod directory;
pub mod download;
pub mod epub;
pub mod http;
pub mod rar;
pub mod zip;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::download::DownloadManager;
use crate::app::models::{Chapter, Manga};
use crate::app::page::Page;
use crate::app::reader::ReaderChapter;
use crate::app::source::{LocalFormat, Source};
use crate::errors::{LoaderError, LoaderResult};

pub use self::directory::DirectoryPageLoader;
pub use self::download::DownloadPageLoader;
pub use self::epub::EpubPageLoader;
pub use self::http::HttpPageLoader;
pub use self::rar::RarPageLoader;
pub use self::zip::ZipPageLoader;

/// The loader strategy chosen for a chapter
#[derive(Debug)]
pub enum PageLoader {
    Download(DownloadPageLoader),
    Http(HttpPageLoader),
    Directory(DirectoryPageLoader),
    Zip(ZipPageLoader),
    Rar(RarPageLoader),
    Epub(EpubPageLoader),
}

impl PageLoader {
    /// Open the loader for a local chapter of a known container format
    pub async fn open_local(format: LocalFormat) -> LoaderResult<Self> {
        Ok(match format {
            LocalFormat::Directory(path) => PageLoader::Directory(DirectoryPageLoader::new(path)),
            LocalFormat::Zip(path) => PageLoader::Zip(ZipPageLoader::open(&path).await?),
            LocalFormat::Rar(path) => PageLoader::Rar(RarPageLoader::open(&path).await?),
            LocalFormat::Epub(path) => PageLoader::Epub(EpubPageLoader::open(&path).await?),
        })
    }

    /// Pages of the chapter in presentation order
    pub async fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        match self {
            PageLoader::Download(loader) => loader.get_pages().await,
            PageLoader::Http(loader) => loader.get_pages().await,
            PageLoader::Directory(loader) => loader.get_pages().await,
            PageLoader::Zip(loader) => loader.get_pages().await,
            PageLoader::Rar(loader) => loader.get_pages(),
            PageLoader::Epub(loader) => loader.get_pages().await,
        }
    }

    /// Make one page readable
    ///
    /// Only remote pages need work; every other loader creates its pages
    /// ready to read.
    pub async fn load_page(&self, page: &Page) -> LoaderResult<()> {
        match self {
            PageLoader::Http(loader) => loader.load_page(page).await,
            _ if self.is_recycled() => Err(LoaderError::Recycled),
            _ => Ok(()),
        }
    }

    /// Retry a page that failed to load
    pub async fn retry_page(&self, page: &Page) -> LoaderResult<()> {
        match self {
            PageLoader::Http(loader) => loader.retry_page(page).await,
            _ => self.load_page(page).await,
        }
    }

    /// Release whatever the loader holds open
    pub fn recycle(&self) {
        match self {
            PageLoader::Download(loader) => loader.recycle(),
            PageLoader::Http(loader) => loader.recycle(),
            PageLoader::Directory(_) => {}
            PageLoader::Zip(loader) => loader.recycle(),
            PageLoader::Rar(loader) => loader.recycle(),
            PageLoader::Epub(loader) => loader.recycle(),
        }
    }

    pub fn is_recycled(&self) -> bool {
        match self {
            PageLoader::Download(loader) => loader.is_recycled(),
            PageLoader::Http(loader) => loader.is_recycled(),
            PageLoader::Directory(_) => false,
            PageLoader::Zip(loader) => loader.is_recycled(),
            PageLoader::Rar(loader) => loader.is_recycled(),
            PageLoader::Epub(loader) => loader.is_recycled(),
        }
    }

    /// Short name of the strategy, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            PageLoader::Download(_) => "download",
            PageLoader::Http(_) => "http",
            PageLoader::Directory(_) => "directory",
            PageLoader::Zip(_) => "zip",
            PageLoader::Rar(_) => "rar",
            PageLoader::Epub(_) => "epub",
        }
    }
}

/// Resolves the chapters of one manga into pages
#[derive(Debug, Clone)]
pub struct ChapterLoader {
    manager: Arc<DownloadManager>,
    manga: Manga,
    source: Source,
}

impl ChapterLoader {
    pub fn new(manager: Arc<DownloadManager>, manga: Manga, source: Source) -> Self {
        Self {
            manager,
            manga,
            source,
        }
    }

    pub fn manga(&self) -> &Manga {
        &self.manga
    }

    /// Load a chapter's pages into its state
    ///
    /// Returns immediately if the chapter is already loaded by a live
    /// loader. Otherwise the chapter goes through `Loading` and ends in
    /// `Loaded` or `Error`; an empty page list counts as an error. A load
    /// that finishes after the last reference was dropped is discarded
    /// with [`LoaderError::Recycled`].
    ///
    /// # Errors
    ///
    /// The same error the chapter's state ends up holding.
    pub async fn load_chapter(&self, chapter: &ReaderChapter) -> Result<(), Arc<LoaderError>> {
        if chapter.state().is_loaded() {
            if let Some(loader) = chapter.page_loader() {
                if !loader.is_recycled() {
                    return Ok(());
                }
            }
        }

        let ticket = chapter.set_loading();
        match self.load(chapter.chapter()).await {
            Ok((loader, pages)) => {
                let info = chapter.chapter();
                if !info.read {
                    chapter.set_requested_page(info.last_page_read.min(pages.len() - 1));
                }
                info!(
                    "Loaded {} pages of chapter {} with the {} loader",
                    pages.len(),
                    info.id,
                    loader.kind()
                );
                let pages = Arc::new(pages.into_iter().map(Arc::new).collect());
                if !chapter.set_loaded(ticket, loader, pages) {
                    return Err(Arc::new(LoaderError::Recycled));
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load chapter {}: {}", chapter.chapter().id, e);
                let error = Arc::new(e);
                chapter.set_error(Arc::clone(&error));
                Err(error)
            }
        }
    }

    async fn load(&self, chapter: &Chapter) -> LoaderResult<(PageLoader, Vec<Page>)> {
        let loader = self.resolve(chapter).await?;
        debug!("Chapter {} uses the {} loader", chapter.id, loader.kind());
        match loader.get_pages().await {
            Ok(pages) if !pages.is_empty() => Ok((loader, pages)),
            Ok(_) => {
                loader.recycle();
                Err(LoaderError::NoPagesFound)
            }
            Err(e) => {
                loader.recycle();
                Err(e)
            }
        }
    }

    /// Pick the loader for a chapter
    pub async fn resolve(&self, chapter: &Chapter) -> LoaderResult<PageLoader> {
        if self
            .manager
            .is_chapter_downloaded(chapter, &self.manga, true)
            .await
        {
            return Ok(PageLoader::Download(DownloadPageLoader::new(
                Arc::clone(&self.manager),
                self.manga.clone(),
                chapter.clone(),
                self.source.clone(),
            )));
        }

        match &self.source {
            Source::Http(source) => Ok(PageLoader::Http(HttpPageLoader::new(
                Arc::clone(source),
                chapter.clone(),
            ))),
            Source::Local(local) => PageLoader::open_local(local.get_format(chapter).await?).await,
            Source::Missing { id } => Err(LoaderError::SourceNotInstalled { id: *id }),
        }
    }
}
