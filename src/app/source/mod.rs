//! Catalog backends and library lookups
//!
//! The download subsystem talks to the outside world through three narrow
//! seams:
//!
//! - [`HttpSource`]: a remote catalog that lists chapters and pages and
//!   serves page images
//! - [`SourceManager`]: resolves a manga's source id to a [`Source`]
//! - [`ChapterRepository`]: read-only access to library rows by id
//!
//! In-memory implementations of the last two are provided for embedding
//! and tests.

pub mod local;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::app::client::{HttpHandler, ImageResponse};
use crate::app::models::{Chapter, ChapterInfo, Manga};
use crate::app::page::Page;
use crate::errors::{SourceError, SourceResult};

pub use local::{LocalFormat, LocalSource};

/// A remote catalog backend
#[async_trait]
pub trait HttpSource: Send + Sync + fmt::Debug {
    /// Stable source id, as stored in `Manga::source`
    fn id(&self) -> i64;

    fn name(&self) -> &str;

    /// ISO 639-1 language code
    fn lang(&self) -> &str;

    async fn get_chapter_list(&self, manga: &Manga) -> SourceResult<Vec<ChapterInfo>>;

    /// Pages of a chapter in presentation order, all in `Queue` status
    async fn get_page_list(&self, chapter: &Chapter) -> SourceResult<Vec<Page>>;

    /// Resolve the image URL of a page that was listed without one
    async fn get_image_url(&self, page: &Page) -> SourceResult<String> {
        Err(SourceError::MissingImageUrl {
            index: page.index(),
        })
    }

    /// Shared HTTP handler used by the default [`HttpSource::fetch_image`]
    fn http_handler(&self) -> Option<&HttpHandler> {
        None
    }

    /// Fetch the bytes of a page whose image URL is known
    ///
    /// The default implementation streams the image through
    /// [`HttpSource::http_handler`] and updates the page's progress.
    async fn fetch_image(&self, page: &Page) -> SourceResult<ImageResponse> {
        let handler = self.http_handler().ok_or_else(|| {
            SourceError::Other(format!("{} has no HTTP client", self.name()))
        })?;
        let image_url = page.image_url().ok_or(SourceError::MissingImageUrl {
            index: page.index(),
        })?;
        let url = HttpHandler::parse_url(&image_url)?;
        handler.get_image(&url, |percent| page.set_progress(percent)).await
    }
}

/// The backend a manga belongs to
#[derive(Debug, Clone)]
pub enum Source {
    Http(Arc<dyn HttpSource>),
    Local(Arc<LocalSource>),
    /// A source id with no installed backend
    Missing { id: i64 },
}

impl Source {
    pub fn id(&self) -> i64 {
        match self {
            Source::Http(source) => source.id(),
            Source::Local(source) => source.id(),
            Source::Missing { id } => *id,
        }
    }

    /// Human readable name, also the basis of the download directory name
    pub fn display_name(&self) -> String {
        match self {
            Source::Http(source) => format!("{} ({})", source.name(), source.lang().to_uppercase()),
            Source::Local(source) => source.name().to_string(),
            Source::Missing { id } => id.to_string(),
        }
    }

    pub fn as_http(&self) -> Option<&Arc<dyn HttpSource>> {
        match self {
            Source::Http(source) => Some(source),
            _ => None,
        }
    }
}

/// Resolves source ids to backends
pub trait SourceManager: Send + Sync {
    fn get(&self, id: i64) -> Option<Source>;

    /// Like [`SourceManager::get`], falling back to [`Source::Missing`]
    fn get_or_stub(&self, id: i64) -> Source {
        self.get(id).unwrap_or(Source::Missing { id })
    }
}

/// Read-only lookups into the library database
pub trait ChapterRepository: Send + Sync {
    fn get_manga(&self, id: i64) -> Option<Manga>;
    fn get_chapter(&self, id: i64) -> Option<Chapter>;
}

/// Source registry held in memory
#[derive(Debug, Default)]
pub struct InMemorySourceManager {
    sources: RwLock<HashMap<i64, Source>>,
}

impl InMemorySourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: Source) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.insert(source.id(), source);
    }
}

impl SourceManager for InMemorySourceManager {
    fn get(&self, id: i64) -> Option<Source> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.get(&id).cloned()
    }
}

/// Library rows held in memory
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    mangas: RwLock<HashMap<i64, Manga>>,
    chapters: RwLock<HashMap<i64, Chapter>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_manga(&self, manga: Manga) {
        let mut mangas = self.mangas.write().unwrap_or_else(|e| e.into_inner());
        mangas.insert(manga.id, manga);
    }

    pub fn insert_chapters(&self, chapters: impl IntoIterator<Item = Chapter>) {
        let mut rows = self.chapters.write().unwrap_or_else(|e| e.into_inner());
        for chapter in chapters {
            rows.insert(chapter.id, chapter);
        }
    }
}

impl ChapterRepository for InMemoryLibrary {
    fn get_manga(&self, id: i64) -> Option<Manga> {
        let mangas = self.mangas.read().unwrap_or_else(|e| e.into_inner());
        mangas.get(&id).cloned()
    }

    fn get_chapter(&self, id: i64) -> Option<Chapter> {
        let chapters = self.chapters.read().unwrap_or_else(|e| e.into_inner());
        chapters.get(&id).cloned()
    }
}
