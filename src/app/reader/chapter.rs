//! Reference counted chapter handle for the reader

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::app::loader::PageLoader;
use crate::app::models::Chapter;
use crate::app::observe::{lock, Observable, SubscriptionId};
use crate::app::page::Page;
use crate::errors::LoaderError;

/// Pages of a loaded chapter, shared with whoever displays them
pub type ChapterPages = Arc<Vec<Arc<Page>>>;

/// Load state of a [`ReaderChapter`]
#[derive(Debug, Clone, Default)]
pub enum ChapterState {
    #[default]
    Wait,
    Loading,
    Error(Arc<LoaderError>),
    Loaded(ChapterPages),
}

impl ChapterState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ChapterState::Loaded(_))
    }

    pub fn pages(&self) -> Option<&ChapterPages> {
        match self {
            ChapterState::Loaded(pages) => Some(pages),
            _ => None,
        }
    }
}

/// A chapter as seen by the reader
///
/// Several views (the current, previous and next chapter of a pager) may
/// hold the same chapter at once. Each holder calls [`ReaderChapter::add_ref`]
/// while it needs the pages and [`ReaderChapter::unref`] when it is done;
/// the page loader is recycled when the last holder lets go.
pub struct ReaderChapter {
    chapter: Chapter,
    state: Observable<ChapterState>,
    page_loader: Mutex<Option<Arc<PageLoader>>>,
    refs: Mutex<usize>,
    // Bumped under `refs` each time the last holder lets go
    releases: AtomicUsize,
    requested_page: AtomicUsize,
}

/// Marks a load started by [`ReaderChapter::set_loading`]
///
/// A load whose ticket predates the last release is stale: its loader is
/// recycled instead of installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadTicket(usize);

impl fmt::Debug for ReaderChapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderChapter")
            .field("chapter", &self.chapter.id)
            .field("state", &self.state.get())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl ReaderChapter {
    pub fn new(chapter: Chapter) -> Self {
        Self {
            chapter,
            state: Observable::new(ChapterState::Wait),
            page_loader: Mutex::new(None),
            refs: Mutex::new(0),
            releases: AtomicUsize::new(0),
            requested_page: AtomicUsize::new(0),
        }
    }

    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn state(&self) -> ChapterState {
        self.state.get()
    }

    pub fn subscribe_state<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&ChapterState) + Send + Sync + 'static,
    {
        self.state.subscribe(f)
    }

    pub fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    /// Pages, if the chapter is loaded
    pub fn pages(&self) -> Option<ChapterPages> {
        self.state.get().pages().cloned()
    }

    pub fn page_loader(&self) -> Option<Arc<PageLoader>> {
        lock(&self.page_loader).clone()
    }

    /// Page the reader should open first
    pub fn requested_page(&self) -> usize {
        self.requested_page.load(Ordering::Relaxed)
    }

    pub fn set_requested_page(&self, page: usize) {
        self.requested_page.store(page, Ordering::Relaxed);
    }

    pub(crate) fn set_loading(&self) -> LoadTicket {
        let ticket = {
            let _refs = lock(&self.refs);
            LoadTicket(self.releases.load(Ordering::SeqCst))
        };
        self.state.set(ChapterState::Loading);
        ticket
    }

    pub(crate) fn set_error(&self, error: Arc<LoaderError>) {
        self.state.set(ChapterState::Error(error));
    }

    /// Install a loader and its pages, recycling any loader it replaces
    ///
    /// If the last holder let go while the load was running the loader is
    /// recycled right away, the chapter stays in `Wait` and this returns
    /// `false`. State subscribers must not touch the reference count.
    pub(crate) fn set_loaded(
        &self,
        ticket: LoadTicket,
        loader: PageLoader,
        pages: ChapterPages,
    ) -> bool {
        let _refs = lock(&self.refs);
        if self.releases.load(Ordering::SeqCst) != ticket.0 {
            debug!(
                "Chapter {} was released while loading, recycling its loader",
                self.chapter.id
            );
            loader.recycle();
            return false;
        }
        let previous = lock(&self.page_loader).replace(Arc::new(loader));
        if let Some(previous) = previous {
            previous.recycle();
        }
        self.state.set(ChapterState::Loaded(pages));
        true
    }

    pub fn ref_count(&self) -> usize {
        *lock(&self.refs)
    }

    pub fn add_ref(&self) {
        *lock(&self.refs) += 1;
    }

    /// Drop one reference; the last one recycles the page loader
    ///
    /// Unbalanced calls are ignored.
    pub fn unref(&self) {
        let mut refs = lock(&self.refs);
        if *refs == 0 {
            warn!("Unbalanced unref on chapter {}", self.chapter.id);
            return;
        }
        *refs -= 1;
        if *refs > 0 {
            return;
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(loader) = lock(&self.page_loader).take() {
            debug!("Recycling chapter {}", self.chapter.id);
            loader.recycle();
        }
        self.state.set(ChapterState::Wait);
    }
}
