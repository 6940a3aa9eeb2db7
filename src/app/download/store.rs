//! Queue persistence
//!
//! [`DownloadStore`] listens to the queue and writes its order to a JSON
//! file after every structural change, so an interrupted session can be
//! restored. Writes happen on a background task fed by a `watch` channel:
//! a burst of queue changes collapses into one write of the latest order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::model::Download;
use crate::app::queue::{DownloadListener, DownloadQueue};
use crate::app::source::{ChapterRepository, SourceManager};
use crate::constants::TEMP_FILE_SUFFIX;
use crate::errors::{DownloadError, DownloadResult};

/// One persisted queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDownload {
    pub manga_id: i64,
    pub chapter_id: i64,
    pub order: usize,
}

/// Persists the download queue to a JSON file
pub struct DownloadStore {
    path: PathBuf,
    queue: Weak<DownloadQueue>,
    tx: watch::Sender<Vec<StoredDownload>>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for DownloadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStore")
            .field("path", &self.path)
            .finish()
    }
}

impl DownloadStore {
    /// Create a store for `queue` and spawn its writer task
    ///
    /// Must be called from within a tokio runtime. The store does not
    /// register itself; add it to the queue with
    /// [`DownloadQueue::add_listener`].
    pub fn new(path: impl Into<PathBuf>, queue: &Arc<DownloadQueue>) -> Arc<Self> {
        let path = path.into();
        let (tx, mut rx) = watch::channel(Vec::new());
        let write_lock = Arc::new(Mutex::new(()));

        let writer_path = path.clone();
        let writer_lock = Arc::clone(&write_lock);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let entries = rx.borrow_and_update().clone();
                let _guard = writer_lock.lock().await;
                if let Err(e) = write_entries(&writer_path, &entries).await {
                    warn!("{}", e);
                }
            }
            debug!("Queue store writer finished");
        });

        Arc::new(Self {
            path,
            queue: Arc::downgrade(queue),
            tx,
            write_lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Vec<StoredDownload> {
        let Some(queue) = self.queue.upgrade() else {
            return Vec::new();
        };
        let snapshot = queue.snapshot();
        snapshot
            .iter()
            .enumerate()
            .map(|(order, download)| StoredDownload {
                manga_id: download.manga.id,
                chapter_id: download.chapter_id(),
                order,
            })
            .collect()
    }

    /// Write the current queue order now
    pub async fn flush(&self) -> DownloadResult<()> {
        let entries = self.entries();
        let _guard = self.write_lock.lock().await;
        write_entries(&self.path, &entries).await
    }

    /// Entries of the queue file, in queue order
    pub async fn read(&self) -> DownloadResult<Vec<StoredDownload>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries: Vec<StoredDownload> =
            serde_json::from_slice(&content).map_err(|e| DownloadError::Persistence {
                what: "download queue",
                reason: e.to_string(),
            })?;
        entries.sort_by_key(|entry| entry.order);
        Ok(entries)
    }

    /// Rebuild downloads from the queue file
    ///
    /// Entries whose manga, chapter or source no longer exist are skipped.
    pub async fn restore(
        &self,
        sources: &dyn SourceManager,
        repository: &dyn ChapterRepository,
    ) -> DownloadResult<Vec<Arc<Download>>> {
        let entries = self.read().await?;
        let total = entries.len();
        let mut downloads = Vec::with_capacity(total);

        for entry in entries {
            let Some(manga) = repository.get_manga(entry.manga_id) else {
                debug!("Dropping queued chapter {}: manga {} is gone", entry.chapter_id, entry.manga_id);
                continue;
            };
            let Some(chapter) = repository.get_chapter(entry.chapter_id) else {
                debug!("Dropping queued chapter {}: chapter is gone", entry.chapter_id);
                continue;
            };
            let Some(source) = sources.get(manga.source).and_then(|s| s.as_http().cloned()) else {
                debug!("Dropping queued chapter {}: source {} is not installed", chapter.id, manga.source);
                continue;
            };
            downloads.push(Arc::new(Download::new(source, manga, chapter)));
        }

        info!("Restored {}/{} queued downloads", downloads.len(), total);
        Ok(downloads)
    }
}

impl DownloadListener for DownloadStore {
    fn update_downloads(&self) {
        // The writer is gone only when the runtime shut down
        let _ = self.tx.send(self.entries());
    }
}

async fn write_entries(path: &Path, entries: &[StoredDownload]) -> DownloadResult<()> {
    let persistence = |reason: String| DownloadError::Persistence {
        what: "download queue",
        reason,
    };

    let json = serde_json::to_vec_pretty(entries).map_err(|e| persistence(e.to_string()))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| persistence(e.to_string()))?;
    }
    let temp_path = PathBuf::from(format!("{}{}", path.display(), TEMP_FILE_SUFFIX));
    tokio::fs::write(&temp_path, &json)
        .await
        .map_err(|e| persistence(e.to_string()))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|_| DownloadError::AtomicOperationFailed {
            temp_path,
            final_path: path.to_path_buf(),
        })
}
