//! Ordered download queue
//!
//! The queue holds an immutable `Vec` behind an `Arc` and replaces it on
//! every mutation. Iterating a [`DownloadQueue::snapshot`] is therefore
//! never disturbed by a concurrent reorder or removal; the worker simply
//! sees the old order until it takes a new snapshot.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::debug;

use crate::app::download::model::{Download, DownloadStatus};
use crate::app::observe::{lock, SubscriptionId};

use super::types::{DownloadListener, ListenerId, ListenerRegistry};

/// Ordered collection of download jobs, unique by chapter id
#[derive(Default)]
pub struct DownloadQueue {
    downloads: RwLock<Arc<Vec<Arc<Download>>>>,
    subscriptions: Mutex<HashMap<i64, SubscriptionId>>,
    listeners: Arc<ListenerRegistry>,
}

impl fmt::Debug for DownloadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<i64> = self.snapshot().iter().map(|d| d.chapter_id()).collect();
        f.debug_struct("DownloadQueue")
            .field("chapters", &ids)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents in queue order
    pub fn snapshot(&self) -> Arc<Vec<Arc<Download>>> {
        Arc::clone(&self.downloads.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn chapter_ids(&self) -> Vec<i64> {
        self.snapshot().iter().map(|d| d.chapter_id()).collect()
    }

    pub fn find(&self, chapter_id: i64) -> Option<Arc<Download>> {
        self.snapshot()
            .iter()
            .find(|d| d.chapter_id() == chapter_id)
            .cloned()
    }

    pub fn contains(&self, chapter_id: i64) -> bool {
        self.find(chapter_id).is_some()
    }

    /// Append downloads, skipping chapters already queued
    ///
    /// Added downloads move to `Queue`. Returns the downloads actually added.
    pub fn add_all(&self, downloads: Vec<Arc<Download>>) -> Vec<Arc<Download>> {
        let added = {
            let mut guard = self.downloads.write().unwrap_or_else(|e| e.into_inner());
            let mut seen: HashSet<i64> = guard.iter().map(|d| d.chapter_id()).collect();
            let added: Vec<Arc<Download>> = downloads
                .into_iter()
                .filter(|d| seen.insert(d.chapter_id()))
                .collect();
            if added.is_empty() {
                return added;
            }
            let mut next = Vec::with_capacity(guard.len() + added.len());
            next.extend(guard.iter().cloned());
            next.extend(added.iter().cloned());
            *guard = Arc::new(next);
            added
        };

        for download in &added {
            self.watch(download);
            download.set_status(DownloadStatus::Queue);
        }
        debug!("Queued {} downloads", added.len());
        self.listeners.notify_downloads();
        added
    }

    /// Remove one chapter's download
    pub fn remove(&self, chapter_id: i64) -> Option<Arc<Download>> {
        self.remove_where(|d| d.chapter_id() == chapter_id)
            .into_iter()
            .next()
    }

    pub fn remove_chapters(&self, chapter_ids: &[i64]) -> Vec<Arc<Download>> {
        let ids: HashSet<i64> = chapter_ids.iter().copied().collect();
        self.remove_where(|d| ids.contains(&d.chapter_id()))
    }

    pub fn remove_manga(&self, manga_id: i64) -> Vec<Arc<Download>> {
        self.remove_where(|d| d.manga.id == manga_id)
    }

    /// Empty the queue
    pub fn clear(&self) -> Vec<Arc<Download>> {
        self.remove_where(|_| true)
    }

    /// Replace the contents with `downloads`, in that order
    ///
    /// Downloads that are dropped by the replacement are detached as if
    /// removed. Duplicates in `downloads` keep their first position.
    pub fn replace_all(&self, downloads: Vec<Arc<Download>>) {
        let (dropped, new) = {
            let mut guard = self.downloads.write().unwrap_or_else(|e| e.into_inner());
            let mut seen = HashSet::new();
            let next: Vec<Arc<Download>> = downloads
                .into_iter()
                .filter(|d| seen.insert(d.chapter_id()))
                .collect();
            let old_ids: HashSet<i64> = guard.iter().map(|d| d.chapter_id()).collect();
            let dropped: Vec<Arc<Download>> = guard
                .iter()
                .filter(|d| !seen.contains(&d.chapter_id()))
                .cloned()
                .collect();
            let new: Vec<Arc<Download>> = next
                .iter()
                .filter(|d| !old_ids.contains(&d.chapter_id()))
                .cloned()
                .collect();
            *guard = Arc::new(next);
            (dropped, new)
        };

        for download in &dropped {
            self.detach(download);
        }
        for download in &new {
            self.watch(download);
            if !download.status().is_finished() {
                download.set_status(DownloadStatus::Queue);
            }
        }
        self.listeners.notify_downloads();
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Tell every listener that the queue changed
    pub fn update_listeners(&self) {
        self.listeners.notify_downloads();
    }

    fn remove_where<F>(&self, predicate: F) -> Vec<Arc<Download>>
    where
        F: Fn(&Download) -> bool,
    {
        let removed = {
            let mut guard = self.downloads.write().unwrap_or_else(|e| e.into_inner());
            let (removed, kept): (Vec<Arc<Download>>, Vec<Arc<Download>>) =
                guard.iter().cloned().partition(|d| predicate(d));
            if removed.is_empty() {
                return removed;
            }
            *guard = Arc::new(kept);
            removed
        };

        for download in &removed {
            self.detach(download);
        }
        debug!("Removed {} downloads from queue", removed.len());
        self.listeners.notify_downloads();
        removed
    }

    /// Forward status changes of a queued download to the listeners
    fn watch(&self, download: &Arc<Download>) {
        let weak: Weak<Download> = Arc::downgrade(download);
        let listeners = Arc::clone(&self.listeners);
        let id = download.subscribe_status(move |_| {
            if let Some(download) = weak.upgrade() {
                listeners.notify_download(&download);
            }
        });
        if let Some(previous) = lock(&self.subscriptions).insert(download.chapter_id(), id) {
            download.unsubscribe_status(previous);
        }
    }

    fn detach(&self, download: &Download) {
        if let Some(id) = lock(&self.subscriptions).remove(&download.chapter_id()) {
            download.unsubscribe_status(id);
        }
        if matches!(
            download.status(),
            DownloadStatus::Queue | DownloadStatus::Downloading
        ) {
            download.set_status(DownloadStatus::NotDownloaded);
        }
    }
}
