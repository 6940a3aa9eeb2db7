//! Download jobs
//!
//! A [`Download`] is one chapter's job in the queue. Its pages are `None`
//! until the worker fetched the page list. Progress figures are derived
//! from the pages every time they are read, so they stay consistent however
//! the pages complete.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::app::models::{Chapter, Manga};
use crate::app::observe::{lock, Observable, SubscriptionId};
use crate::app::page::{Page, PageStatus};
use crate::app::source::HttpSource;

/// State of a download job
///
/// `NotDownloaded -> Queue -> Downloading -> Downloaded | Error`. `Error`
/// goes back to `Queue` when the worker is started again. `Checked` is a
/// selection mark for presentation layers and is never set by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    Queue,
    Downloading,
    Downloaded,
    Error,
    Checked,
}

impl DownloadStatus {
    /// Whether the worker has nothing left to do for this job
    pub fn is_finished(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::Error)
    }
}

/// One chapter's download job
#[derive(Debug)]
pub struct Download {
    pub source: Arc<dyn HttpSource>,
    pub manga: Manga,
    pub chapter: Chapter,
    pages: Mutex<Option<Vec<Arc<Page>>>>,
    status: Observable<DownloadStatus>,
    queued_at: DateTime<Utc>,
}

impl Download {
    pub fn new(source: Arc<dyn HttpSource>, manga: Manga, chapter: Chapter) -> Self {
        Self {
            source,
            manga,
            chapter,
            pages: Mutex::new(None),
            status: Observable::new(DownloadStatus::default()),
            queued_at: Utc::now(),
        }
    }

    pub fn chapter_id(&self) -> i64 {
        self.chapter.id
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    /// Pages, once the page list was fetched
    pub fn pages(&self) -> Option<Vec<Arc<Page>>> {
        lock(&self.pages).clone()
    }

    pub fn set_pages(&self, pages: Option<Vec<Arc<Page>>>) {
        *lock(&self.pages) = pages;
    }

    pub fn status(&self) -> DownloadStatus {
        self.status.get()
    }

    /// Change the status and notify status subscribers
    pub fn set_status(&self, status: DownloadStatus) {
        self.status.set(status);
    }

    pub fn subscribe_status<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&DownloadStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(f)
    }

    pub fn unsubscribe_status(&self, id: SubscriptionId) -> bool {
        self.status.unsubscribe(id)
    }

    /// Sum of page progress percentages
    pub fn total_progress(&self) -> u32 {
        lock(&self.pages)
            .as_ref()
            .map(|pages| pages.iter().map(|p| u32::from(p.progress())).sum())
            .unwrap_or(0)
    }

    /// Number of pages in `Ready` status
    pub fn downloaded_images(&self) -> usize {
        lock(&self.pages)
            .as_ref()
            .map(|pages| {
                pages
                    .iter()
                    .filter(|p| p.status() == PageStatus::Ready)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Average page progress, rounded
    pub fn progress(&self) -> u8 {
        let pages = lock(&self.pages);
        match pages.as_ref() {
            Some(pages) if !pages.is_empty() => {
                let sum: u32 = pages.iter().map(|p| u32::from(p.progress())).sum();
                (sum as f64 / pages.len() as f64).round() as u8
            }
            _ => 0,
        }
    }
}
