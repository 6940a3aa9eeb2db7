//! Pages of a chapter
//!
//! A [`Page`] is shared between the component that produces it (a source,
//! a page loader or the download worker) and whoever displays it. Its
//! index is fixed at creation and defines presentation order; status,
//! progress and the byte stream change as the page is fetched.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::app::loader::archive::ZipHandle;
use crate::app::observe::{lock, Observable, SubscriptionId};
use crate::errors::{LoaderError, LoaderResult};

/// Lifecycle of a page
///
/// Remote pages walk `Queue -> LoadPage -> DownloadImage -> Ready`; pages
/// read from disk or from an archive are created `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageStatus {
    #[default]
    Queue,
    /// Resolving the image URL
    LoadPage,
    /// Fetching image bytes
    DownloadImage,
    Ready,
    Error,
}

/// Where a page's bytes can be read from
#[derive(Debug, Clone)]
pub enum PageStream {
    /// Image file on disk
    File(PathBuf),
    /// Bytes already held in memory
    Memory(Bytes),
    /// Entry of an open zip archive
    Zip { archive: Arc<ZipHandle>, entry: String },
    /// Entry of a rar archive, reopened on every read until its loader is
    /// recycled
    Rar {
        path: PathBuf,
        entry: String,
        recycled: Arc<AtomicBool>,
    },
}

impl PageStream {
    /// Read the full image
    pub async fn read(&self) -> LoaderResult<Bytes> {
        match self {
            PageStream::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
            PageStream::Memory(bytes) => Ok(bytes.clone()),
            PageStream::Zip { archive, entry } => {
                let archive = Arc::clone(archive);
                let entry = entry.clone();
                tokio::task::spawn_blocking(move || archive.read_entry(&entry))
                    .await
                    .map_err(|e| LoaderError::Io(std::io::Error::other(e)))?
                    .map(Bytes::from)
            }
            PageStream::Rar { recycled, .. } if recycled.load(Ordering::SeqCst) => {
                Err(LoaderError::Recycled)
            }
            PageStream::Rar { path, entry, .. } => {
                crate::app::loader::rar::read_entry(path, entry).await
            }
        }
    }
}

/// One image within a chapter
#[derive(Debug)]
pub struct Page {
    index: usize,
    url: String,
    image_url: Mutex<Option<String>>,
    status: Observable<PageStatus>,
    progress: AtomicU8,
    stream: Mutex<Option<PageStream>>,
}

impl Page {
    /// A queued page whose image URL may still be unknown
    pub fn new(index: usize, url: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            index,
            url: url.into(),
            image_url: Mutex::new(image_url),
            status: Observable::new(PageStatus::Queue),
            progress: AtomicU8::new(0),
            stream: Mutex::new(None),
        }
    }

    /// A page whose bytes are immediately readable
    pub fn ready(index: usize, stream: PageStream) -> Self {
        let page = Self::new(index, "", None);
        page.set_stream(Some(stream));
        page.status.set(PageStatus::Ready);
        page.progress.store(100, Ordering::Relaxed);
        page
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based page number as shown to users
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn image_url(&self) -> Option<String> {
        lock(&self.image_url).clone()
    }

    pub fn set_image_url(&self, url: Option<String>) {
        *lock(&self.image_url) = url;
    }

    pub fn status(&self) -> PageStatus {
        self.status.get()
    }

    pub fn set_status(&self, status: PageStatus) {
        self.status.set(status);
    }

    /// Observe status changes; remove with [`Page::unsubscribe_status`]
    pub fn subscribe_status<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&PageStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(f)
    }

    pub fn unsubscribe_status(&self, id: SubscriptionId) -> bool {
        self.status.unsubscribe(id)
    }

    /// Download progress in percent
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }

    pub fn stream(&self) -> Option<PageStream> {
        lock(&self.stream).clone()
    }

    pub fn set_stream(&self, stream: Option<PageStream>) {
        *lock(&self.stream) = stream;
    }

    /// Read the page's bytes through its stream
    ///
    /// # Errors
    ///
    /// `LoaderError::StreamUnavailable` if the page has no stream yet.
    pub async fn read(&self) -> LoaderResult<Bytes> {
        match self.stream() {
            Some(stream) => stream.read().await,
            None => Err(LoaderError::StreamUnavailable { index: self.index }),
        }
    }
}
