//! Listener types for the download queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::app::download::model::Download;
use crate::app::observe::lock;

/// Receives queue notifications
///
/// Both callbacks run synchronously on the thread that changed the queue,
/// after the change is complete and with no queue lock held.
pub trait DownloadListener: Send + Sync {
    /// The structure of the queue changed (add, remove, reorder, clear)
    fn update_downloads(&self);

    /// The status of one queued download changed
    fn update_download(&self, _download: &Download) {}
}

/// Handle returned by [`super::DownloadQueue::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners, shared with the per-download status forwarders
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn DownloadListener>)>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    fn listeners(&self) -> Vec<Arc<dyn DownloadListener>> {
        lock(&self.entries)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn notify_downloads(&self) {
        for listener in self.listeners() {
            listener.update_downloads();
        }
    }

    pub(crate) fn notify_download(&self, download: &Download) {
        for listener in self.listeners() {
            listener.update_download(download);
        }
    }
}
