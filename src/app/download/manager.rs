//! Download manager
//!
//! [`DownloadManager`] is the entry point of the download subsystem. It
//! wires the provider, cache, queue, worker and persistence together and
//! exposes the operations the rest of the application needs.
//!
//! Every operation that changes the structure of the queue while the worker
//! may be running goes through the same sequence: pause the worker and wait
//! for its in-flight pages, mutate the queue, then resume only if the worker
//! was running and the queue still has work. The worker never sees a queue
//! that is half way through a change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::model::Download;
use super::pending::PendingDeleter;
use super::preferences::DownloadPreferences;
use super::provider::DownloadProvider;
use super::store::DownloadStore;
use crate::app::cache::{CacheConfig, DownloadCache};
use crate::app::loader::directory::list_image_files;
use crate::app::models::{Chapter, Manga};
use crate::app::page::{Page, PageStream};
use crate::app::queue::{DownloadListener, DownloadQueue, ListenerId};
use crate::app::source::{ChapterRepository, Source, SourceManager};
use crate::app::worker::{Downloader, DownloaderEvent, WorkerConfig};
use crate::constants::CBZ_EXTENSION;
use crate::errors::{CacheResult, DownloadError, DownloadResult, LoaderError, LoaderResult, Result};

/// Facade over the download subsystem
pub struct DownloadManager {
    prefs: DownloadPreferences,
    provider: Arc<DownloadProvider>,
    cache: Arc<DownloadCache>,
    queue: Arc<DownloadQueue>,
    downloader: Downloader,
    sources: Arc<dyn SourceManager>,
    store: Arc<DownloadStore>,
    pending: PendingDeleter,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("root", &self.provider.root())
            .field("downloader", &self.downloader)
            .finish()
    }
}

impl DownloadManager {
    /// Build the subsystem rooted at `prefs.root()`
    ///
    /// Must be called from within a tokio runtime; queue persistence runs
    /// on a background task.
    pub fn new(
        prefs: DownloadPreferences,
        worker_config: WorkerConfig,
        cache_config: CacheConfig,
        sources: Arc<dyn SourceManager>,
    ) -> Result<Self> {
        prefs.validate()?;
        let root = prefs.root();
        let provider = Arc::new(DownloadProvider::new(&root));
        let cache = Arc::new(DownloadCache::new(
            Arc::clone(&provider),
            Arc::clone(&sources),
            cache_config,
        ));
        let queue = Arc::new(DownloadQueue::new());

        let store = DownloadStore::new(prefs.queue_path(), &queue);
        queue.add_listener(store.clone());
        let pending = PendingDeleter::new(prefs.pending_delete_path());

        let downloader = Downloader::new(
            worker_config,
            prefs.clone(),
            Arc::clone(&provider),
            Arc::clone(&cache),
            Arc::clone(&queue),
            Arc::clone(&sources),
        )?;

        info!("Download manager ready at {}", root.display());
        Ok(Self {
            prefs,
            provider,
            cache,
            queue,
            downloader,
            sources,
            store,
            pending,
        })
    }

    pub fn preferences(&self) -> &DownloadPreferences {
        &self.prefs
    }

    pub fn provider(&self) -> &Arc<DownloadProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<DownloadCache> {
        &self.cache
    }

    /// The observable queue
    pub fn queue(&self) -> &Arc<DownloadQueue> {
        &self.queue
    }

    pub fn sources(&self) -> &Arc<dyn SourceManager> {
        &self.sources
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        self.queue.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.queue.remove_listener(id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DownloaderEvent> {
        self.downloader.subscribe()
    }

    /// Put downloads saved by a previous session back in the queue
    pub async fn restore_queue(&self, repository: &dyn ChapterRepository) -> DownloadResult<usize> {
        let downloads = self.store.restore(self.sources.as_ref(), repository).await?;
        Ok(self.queue.add_all(downloads).len())
    }

    /// Write the queue file now instead of waiting for the background writer
    pub async fn persist_queue(&self) -> DownloadResult<()> {
        self.store.flush().await
    }

    pub fn start_downloads(&self) -> bool {
        self.downloader.start()
    }

    pub async fn pause_downloads(&self) {
        self.downloader.pause().await;
    }

    pub fn stop_downloads(&self, reason: Option<String>) {
        self.downloader.stop(reason);
    }

    /// Cancel every queued download
    ///
    /// What the cancelled downloads left on disk is deleted before the
    /// queue is emptied.
    pub async fn clear_queue(&self, is_notification: bool) -> DownloadResult<()> {
        let pending = self.queue.snapshot().to_vec();
        self.delete_pending_downloads(&pending).await?;
        self.downloader.clear_queue(is_notification);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.downloader.is_running()
    }

    /// Not running, with work left in the queue
    pub fn is_paused(&self) -> bool {
        !self.downloader.is_running() && !self.queue.is_empty()
    }

    pub fn has_queue(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Queue chapters that are neither downloaded nor queued
    ///
    /// Returns the number of chapters added.
    pub async fn download_chapters(&self, manga: &Manga, chapters: &[Chapter], auto_start: bool) -> usize {
        self.downloader.queue_chapters(manga, chapters, auto_start).await
    }

    /// Move a queued chapter to the front and make sure the worker runs
    pub async fn start_download_now(&self, chapter_id: i64) -> bool {
        let Some(download) = self.queue.find(chapter_id) else {
            return false;
        };
        let mut order: Vec<Arc<Download>> = vec![Arc::clone(&download)];
        order.extend(
            self.queue
                .snapshot()
                .iter()
                .filter(|d| d.chapter_id() != chapter_id)
                .cloned(),
        );
        self.reorder_queue(order).await;

        if self.is_paused() {
            self.downloader.start();
        }
        true
    }

    /// Replace the queue contents with `downloads`
    ///
    /// An empty list stops the worker and clears the queue. Otherwise the
    /// worker is paused around the replacement and restarted if it was
    /// running before.
    pub async fn reorder_queue(&self, downloads: Vec<Arc<Download>>) {
        let was_running = self.downloader.is_running();
        if downloads.is_empty() {
            self.downloader.stop(None);
            self.queue.clear();
            return;
        }

        if was_running {
            self.downloader.pause().await;
        }
        self.queue.replace_all(downloads);
        if was_running {
            self.downloader.start();
        }
    }

    /// Put downloads at the head of the queue and start the worker
    pub async fn add_downloads_to_start_of_queue(&self, downloads: Vec<Arc<Download>>) {
        if downloads.is_empty() {
            return;
        }
        let mut order = downloads;
        order.extend(self.queue.snapshot().iter().cloned());
        self.reorder_queue(order).await;
        if !self.downloader.is_running() {
            self.downloader.start();
        }
    }

    /// Pages of a downloaded chapter directory, in natural file name order
    pub async fn build_page_list(
        &self,
        source: &Source,
        manga: &Manga,
        chapter: &Chapter,
    ) -> LoaderResult<Vec<Page>> {
        let Some(dir) = self.provider.find_chapter_dir(chapter, manga, source).await else {
            return Err(LoaderError::NoPagesFound);
        };
        let files = list_image_files(&dir).await?;
        if files.is_empty() {
            return Err(LoaderError::NoPagesFound);
        }
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(index, path)| Page::ready(index, PageStream::File(path)))
            .collect())
    }

    pub async fn is_chapter_downloaded(&self, chapter: &Chapter, manga: &Manga, skip_cache: bool) -> bool {
        self.cache.is_chapter_downloaded(chapter, manga, skip_cache).await
    }

    /// Queued download of a chapter, if any
    pub fn get_chapter_download(&self, chapter_id: i64) -> Option<Arc<Download>> {
        self.queue.find(chapter_id)
    }

    pub async fn get_download_count(&self, manga: &Manga, skip_cache: bool) -> usize {
        self.cache.get_download_count(manga, skip_cache).await
    }

    /// Delete what queued downloads left on disk, grouped by manga
    pub async fn delete_pending_downloads(&self, downloads: &[Arc<Download>]) -> DownloadResult<()> {
        let mut by_manga: BTreeMap<i64, (Manga, Source, Vec<Chapter>)> = BTreeMap::new();
        for download in downloads {
            by_manga
                .entry(download.manga.id)
                .or_insert_with(|| {
                    (
                        download.manga.clone(),
                        Source::Http(Arc::clone(&download.source)),
                        Vec::new(),
                    )
                })
                .2
                .push(download.chapter.clone());
        }
        for (manga, source, chapters) in by_manga.into_values() {
            self.delete_chapters(&chapters, &manga, &source, false).await?;
        }
        Ok(())
    }

    /// Chapters that may be deleted, honouring the keep-bookmarked preference
    pub fn chapters_to_delete(&self, chapters: &[Chapter]) -> Vec<Chapter> {
        chapters
            .iter()
            .filter(|c| self.prefs.remove_bookmarked_chapters || !c.bookmark)
            .cloned()
            .collect()
    }

    /// Remove chapters from the queue and from disk
    ///
    /// Bookmarked chapters are kept unless `force` is set or the
    /// preferences allow removing them. Returns the chapters actually
    /// deleted.
    pub async fn delete_chapters(
        &self,
        chapters: &[Chapter],
        manga: &Manga,
        source: &Source,
        force: bool,
    ) -> DownloadResult<Vec<Chapter>> {
        let chapters = if force {
            chapters.to_vec()
        } else {
            self.chapters_to_delete(chapters)
        };
        if chapters.is_empty() {
            return Ok(chapters);
        }

        let ids: Vec<i64> = chapters.iter().map(|c| c.id).collect();
        self.mutate_queue(|queue| {
            queue.remove_chapters(&ids);
        })
        .await;

        let mut dirs = self.provider.find_chapter_dirs(&chapters, manga, source).await;
        dirs.extend(self.provider.find_temp_chapter_dirs(&chapters, manga, source).await);
        for dir in &dirs {
            remove_path(dir).await?;
        }
        self.cache.remove_chapters(&chapters, manga);

        if self.cache.get_download_count(manga, true).await == 0 {
            self.remove_manga_dir_if_empty(manga, source).await;
        }
        debug!("Deleted {} chapters of {}", chapters.len(), manga.title);
        Ok(chapters)
    }

    /// Remove orphaned and optionally read downloads of a manga
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_chapters(
        &self,
        all_chapters: &[Chapter],
        manga: &Manga,
        source: &Source,
        remove_read: bool,
        remove_non_favorite: bool,
    ) -> DownloadResult<usize> {
        if remove_non_favorite && !manga.favorite {
            let manga_id = manga.id;
            self.mutate_queue(|queue| {
                queue.remove_manga(manga_id);
            })
            .await;

            let Some(dir) = self.provider.find_manga_dir(manga, source).await else {
                self.cache.remove_manga(manga);
                return Ok(0);
            };
            let cleaned = 1 + count_entries(&dir).await?;
            tokio::fs::remove_dir_all(&dir).await?;
            self.cache.remove_manga(manga);
            return Ok(cleaned);
        }

        let mut cleaned = 0;
        let unmatched = self
            .provider
            .find_unmatched_chapter_dirs(all_chapters, manga, source)
            .await;
        let names: Vec<String> = unmatched
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        for path in &unmatched {
            remove_path(path).await?;
        }
        cleaned += unmatched.len();
        self.cache.remove_folders(&names, manga);

        if remove_read {
            let read: Vec<Chapter> = all_chapters.iter().filter(|c| c.read).cloned().collect();
            let ids: Vec<i64> = read.iter().map(|c| c.id).collect();
            self.mutate_queue(|queue| {
                queue.remove_chapters(&ids);
            })
            .await;

            let dirs = self.provider.find_chapter_dirs(&read, manga, source).await;
            for dir in &dirs {
                remove_path(dir).await?;
            }
            cleaned += dirs.len();
            self.cache.remove_chapters(&read, manga);
        }

        if self.cache.get_download_count(manga, true).await == 0 {
            if !self.remove_manga_dir_if_empty(manga, source).await {
                error!("Cache and download folder don't match for {}", manga.title);
            }
        }
        Ok(cleaned)
    }

    /// Remove a manga from the queue and delete all of its downloads
    pub async fn delete_manga(&self, manga: &Manga, source: &Source) -> DownloadResult<()> {
        let manga_id = manga.id;
        self.mutate_queue(|queue| {
            queue.remove_manga(manga_id);
        })
        .await;

        if let Some(dir) = self.provider.find_manga_dir(manga, source).await {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        self.cache.remove_manga(manga);
        info!("Deleted downloads of {}", manga.title);
        Ok(())
    }

    pub async fn get_manga_folders(&self, source: &Source) -> Vec<PathBuf> {
        self.provider.get_manga_folders(source).await
    }

    /// Record chapters for deletion by [`DownloadManager::delete_pending_chapters`]
    pub async fn enqueue_delete_chapters(&self, chapters: &[Chapter], manga: &Manga) -> DownloadResult<()> {
        let chapters = self.chapters_to_delete(chapters);
        self.pending.add_chapters(&chapters, manga).await
    }

    /// Delete every chapter recorded by [`DownloadManager::enqueue_delete_chapters`]
    pub async fn delete_pending_chapters(&self) -> DownloadResult<usize> {
        let mut deleted = 0;
        for (manga, chapters) in self.pending.get_pending_chapters().await? {
            let Some(source) = self.sources.get(manga.source) else {
                warn!("Skipping pending deletions of {}: source {} missing", manga.title, manga.source);
                continue;
            };
            deleted += self.delete_chapters(&chapters, &manga, &source, false).await?.len();
        }
        Ok(deleted)
    }

    /// Rename a downloaded chapter after its name or scanlator changed
    ///
    /// A `.cbz` chapter keeps its extension. Returns false when there was
    /// nothing to rename.
    pub async fn rename_chapter(
        &self,
        source: &Source,
        manga: &Manga,
        old_chapter: &Chapter,
        new_chapter: &Chapter,
    ) -> DownloadResult<bool> {
        let manga_dir = self.provider.get_manga_dir(manga, source).await?;

        let mut old_path = None;
        for name in self.provider.get_valid_chapter_file_names(old_chapter) {
            let candidate = manga_dir.join(&name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                old_path = Some((candidate, name));
                break;
            }
        }
        let Some((old_path, old_name)) = old_path else {
            return Ok(false);
        };

        let mut new_name = self.provider.get_chapter_dir_name(new_chapter);
        let archive_suffix = format!(".{}", CBZ_EXTENSION);
        if old_name.ends_with(&archive_suffix) {
            new_name.push_str(&archive_suffix);
        }
        if old_name == new_name {
            return Ok(false);
        }

        let new_path = manga_dir.join(&new_name);
        if let Err(e) = tokio::fs::rename(&old_path, &new_path).await {
            error!("Could not rename downloaded chapter {}: {}", old_name, e);
            return Err(DownloadError::AtomicOperationFailed {
                temp_path: old_path,
                final_path: new_path,
            });
        }
        self.cache.remove_chapters(std::slice::from_ref(old_chapter), manga);
        self.cache.add_chapter(&new_name, manga);
        Ok(true)
    }

    /// Rebuild the download cache from disk
    pub async fn refresh_cache(&self) -> CacheResult<()> {
        self.cache.force_renew_cache().await
    }

    /// Pause, change the queue, then resume if there is still work
    async fn mutate_queue<F>(&self, mutate: F)
    where
        F: FnOnce(&DownloadQueue),
    {
        let was_running = self.downloader.is_running();
        if was_running {
            self.downloader.pause().await;
        }
        mutate(&self.queue);
        if was_running {
            if self.queue.is_empty() {
                self.downloader.stop(None);
            } else {
                self.downloader.start();
            }
        }
    }

    /// Delete the manga directory if it has no entries left
    async fn remove_manga_dir_if_empty(&self, manga: &Manga, source: &Source) -> bool {
        let Some(dir) = self.provider.find_manga_dir(manga, source).await else {
            self.cache.remove_manga(manga);
            return true;
        };
        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => {
                self.cache.remove_manga(manga);
                true
            }
            Err(e) => {
                debug!("Keeping {}: {}", dir.display(), e);
                false
            }
        }
    }
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

async fn count_entries(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while entries.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}
