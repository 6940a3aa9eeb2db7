//! Chapter download worker
//!
//! One background task consumes the queue in order, one chapter at a time.
//! Within a chapter, pages are fetched with bounded concurrency into the
//! chapter's `_tmp` staging directory as `NNN.tmp`, renamed to `NNN.<ext>`
//! once complete. A chapter is finalised only when every page is on disk:
//! the staging directory is renamed, or packed into a `.cbz`.
//!
//! Pausing is cooperative. [`Downloader::pause`] clears the running flag and
//! waits for the task; pages already in flight finish, pages not yet
//! started are skipped, and the chapter goes back to `Queue` with its
//! staging directory intact so the next run resumes from it.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use super::stats::{BackoffCalculator, ChapterOutcome};
use super::types::DownloaderEvent;
use crate::app::cache::DownloadCache;
use crate::app::client::ImageResponse;
use crate::app::download::model::{Download, DownloadStatus};
use crate::app::download::preferences::DownloadPreferences;
use crate::app::download::provider::DownloadProvider;
use crate::app::image::page_extension;
use crate::app::models::{Chapter, Manga};
use crate::app::naming::natural_cmp;
use crate::app::observe::lock;
use crate::app::page::{Page, PageStatus};
use crate::app::queue::DownloadQueue;
use crate::app::source::{HttpSource, Source, SourceManager};
use crate::constants::{CBZ_EXTENSION, TEMP_FILE_SUFFIX};
use crate::errors::{DownloadError, DownloadResult, SourceError, SourceResult};

/// Result of one page within a chapter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Fetched,
    Reused,
    Failed,
    Skipped,
}

/// How a chapter run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChapterRun {
    Completed,
    Paused,
}

/// State shared between the [`Downloader`] handle and its background task
struct ChapterWorker {
    config: WorkerConfig,
    prefs: DownloadPreferences,
    provider: Arc<DownloadProvider>,
    cache: Arc<DownloadCache>,
    queue: Arc<DownloadQueue>,
    running: AtomicBool,
    events: broadcast::Sender<DownloaderEvent>,
}

/// The download worker
pub struct Downloader {
    worker: Arc<ChapterWorker>,
    sources: Arc<dyn SourceManager>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("running", &self.is_running())
            .field("queue", &self.worker.queue)
            .field("config", &self.worker.config)
            .finish()
    }
}

impl Downloader {
    pub fn new(
        config: WorkerConfig,
        prefs: DownloadPreferences,
        provider: Arc<DownloadProvider>,
        cache: Arc<DownloadCache>,
        queue: Arc<DownloadQueue>,
        sources: Arc<dyn SourceManager>,
    ) -> DownloadResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_buffer_size);
        Ok(Self {
            worker: Arc::new(ChapterWorker {
                config,
                prefs,
                provider,
                cache,
                queue,
                running: AtomicBool::new(false),
                events,
            }),
            sources,
            task: Mutex::new(None),
        })
    }

    pub fn queue(&self) -> &Arc<DownloadQueue> {
        &self.worker.queue
    }

    pub fn is_running(&self) -> bool {
        self.worker.running.load(Ordering::SeqCst)
    }

    /// Receive worker events
    pub fn subscribe(&self) -> broadcast::Receiver<DownloaderEvent> {
        self.worker.events.subscribe()
    }

    /// Start consuming the queue
    ///
    /// Returns false when the worker is already running or the queue is
    /// empty. Unfinished downloads, including errored ones, are requeued.
    pub fn start(&self) -> bool {
        if self.is_running() || self.worker.queue.is_empty() {
            return false;
        }
        if self
            .worker
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        for download in self.worker.queue.snapshot().iter() {
            if download.status() != DownloadStatus::Downloaded {
                download.set_status(DownloadStatus::Queue);
            }
        }

        let worker = Arc::clone(&self.worker);
        let handle = tokio::spawn(worker.run());
        if let Some(previous) = lock(&self.task).replace(handle) {
            previous.abort();
        }

        info!("Downloader started with {} queued chapters", self.worker.queue.len());
        self.worker.emit(DownloaderEvent::Started);
        true
    }

    /// Stop after the pages in flight, keeping the queue
    pub async fn pause(&self) {
        self.worker.running.store(false, Ordering::SeqCst);
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Downloader task failed: {}", e);
                }
            }
        }

        for download in self.worker.queue.snapshot().iter() {
            if download.status() == DownloadStatus::Downloading {
                download.set_status(DownloadStatus::Queue);
            }
        }
        debug!("Downloader paused");
        self.worker.emit(DownloaderEvent::Paused);
    }

    /// Halt immediately, failing the chapter in progress
    pub fn stop(&self, reason: Option<String>) {
        self.worker.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }

        for download in self.worker.queue.snapshot().iter() {
            if download.status() == DownloadStatus::Downloading {
                download.set_status(DownloadStatus::Error);
            }
        }
        match &reason {
            Some(reason) => warn!("Downloader stopped: {}", reason),
            None => info!("Downloader stopped"),
        }
        self.worker.emit(DownloaderEvent::Stopped { reason });
    }

    /// Halt and empty the queue
    pub fn clear_queue(&self, is_notification: bool) {
        self.worker.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
        self.worker.queue.clear();
        if is_notification {
            self.worker.emit(DownloaderEvent::Stopped { reason: None });
        }
    }

    /// Drop every queued chapter of a manga
    pub fn clear_queue_for_manga(&self, manga: &Manga, is_notification: bool) {
        self.worker.queue.remove_manga(manga.id);
        if is_notification && self.worker.queue.is_empty() {
            self.worker.emit(DownloaderEvent::Stopped { reason: None });
        }
    }

    /// Queue chapters of a manga that are neither on disk nor already queued
    ///
    /// Returns the number of chapters added.
    pub async fn queue_chapters(&self, manga: &Manga, chapters: &[Chapter], auto_start: bool) -> usize {
        let source = self.sources.get_or_stub(manga.source);
        let Some(http) = source.as_http().cloned() else {
            warn!(
                "Cannot download chapters of {}: source {} is not a remote source",
                manga.title,
                source.id()
            );
            return 0;
        };

        let mut downloads = Vec::new();
        for chapter in chapters {
            if self.worker.queue.contains(chapter.id) {
                continue;
            }
            if self
                .worker
                .provider
                .find_chapter_dir(chapter, manga, &source)
                .await
                .is_some()
            {
                continue;
            }
            downloads.push(Arc::new(Download::new(
                Arc::clone(&http),
                manga.clone(),
                chapter.clone(),
            )));
        }

        let added = self.worker.queue.add_all(downloads).len();
        if added > 0 {
            debug!("Queued {} chapters of {}", added, manga.title);
            if auto_start {
                self.start();
            }
        }
        added
    }
}

impl ChapterWorker {
    fn emit(&self, event: DownloaderEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(self: Arc<Self>) {
        loop {
            if !self.is_running() {
                break;
            }

            let next = self
                .queue
                .snapshot()
                .iter()
                .find(|d| d.status() == DownloadStatus::Queue)
                .cloned();

            let Some(download) = next else {
                self.running.store(false, Ordering::SeqCst);
                // A start that raced the end of the queue
                if self.has_queued()
                    && self
                        .running
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    continue;
                }
                info!("Download queue finished");
                self.emit(DownloaderEvent::Stopped { reason: None });
                break;
            };

            self.download_chapter(&download).await;
            if download.status() == DownloadStatus::Downloaded {
                self.queue.remove(download.chapter_id());
            }
        }
    }

    fn has_queued(&self) -> bool {
        self.queue
            .snapshot()
            .iter()
            .any(|d| d.status() == DownloadStatus::Queue)
    }

    async fn download_chapter(&self, download: &Arc<Download>) {
        let chapter_id = download.chapter_id();
        match self.try_download_chapter(download).await {
            Ok(ChapterRun::Completed) => {
                info!("Downloaded {} - {}", download.manga.title, download.chapter.name);
                self.emit(DownloaderEvent::ChapterCompleted { chapter_id });
            }
            Ok(ChapterRun::Paused) => {
                debug!("Paused during {}", download.chapter.name);
                download.set_status(DownloadStatus::Queue);
            }
            Err(e) => {
                error!(
                    "Download of {} - {} failed: {}",
                    download.manga.title, download.chapter.name, e
                );
                download.set_status(DownloadStatus::Error);
                self.emit(DownloaderEvent::ChapterFailed {
                    chapter_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn try_download_chapter(&self, download: &Arc<Download>) -> DownloadResult<ChapterRun> {
        let source = Source::Http(Arc::clone(&download.source));
        let manga_dir = self.provider.get_manga_dir(&download.manga, &source).await?;
        let chapter_dir_name = self.provider.get_chapter_dir_name(&download.chapter);
        let tmp_dir = manga_dir.join(DownloadProvider::temp_dir_name(&chapter_dir_name));

        let pages = match download.pages() {
            Some(pages) => pages,
            None => {
                let pages = download.source.get_page_list(&download.chapter).await?;
                if pages.is_empty() {
                    return Err(SourceError::EmptyPageList.into());
                }
                let pages: Vec<Arc<Page>> = pages.into_iter().map(Arc::new).collect();
                download.set_pages(Some(pages.clone()));
                pages
            }
        };

        tokio::fs::create_dir_all(&tmp_dir).await?;
        download.set_status(DownloadStatus::Downloading);
        remove_partial_files(&tmp_dir).await?;
        let existing = list_page_files(&tmp_dir).await?;

        let source = &download.source;
        let tmp_dir_ref = tmp_dir.as_path();
        let existing_ref = &existing;
        // Owned pages and boxed futures: the task future must be `Send`
        let outcomes: Vec<PageOutcome> = stream::iter(pages.iter().cloned())
            .map(|page| {
                let fetch: BoxFuture<'_, PageOutcome> = async move {
                    self.download_page(source, &page, tmp_dir_ref, existing_ref)
                        .await
                }
                .boxed();
                fetch
            })
            .buffer_unordered(self.prefs.page_concurrency.max(1))
            .collect()
            .await;

        let outcome = outcomes.iter().fold(ChapterOutcome::default(), |mut acc, o| {
            match o {
                PageOutcome::Fetched => acc.fetched += 1,
                PageOutcome::Reused => acc.reused += 1,
                PageOutcome::Failed => acc.failed += 1,
                PageOutcome::Skipped => acc.skipped += 1,
            }
            acc
        });
        debug!(
            "{}: {} fetched, {} reused, {} failed, {} skipped",
            download.chapter.name, outcome.fetched, outcome.reused, outcome.failed, outcome.skipped
        );

        if outcome.skipped > 0 && !self.is_running() {
            return Ok(ChapterRun::Paused);
        }

        self.finalise(download, &manga_dir, &tmp_dir, &chapter_dir_name, pages.len())
            .await?;
        Ok(ChapterRun::Completed)
    }

    async fn download_page(
        &self,
        source: &Arc<dyn HttpSource>,
        page: &Arc<Page>,
        tmp_dir: &Path,
        existing: &HashMap<String, String>,
    ) -> PageOutcome {
        if !self.is_running() {
            return PageOutcome::Skipped;
        }

        let base = page_file_stem(page);
        if existing.contains_key(&base) {
            page.set_progress(100);
            page.set_status(PageStatus::Ready);
            return PageOutcome::Reused;
        }

        match self.fetch_page(source, page, tmp_dir, &base).await {
            Ok(path) => {
                debug!("Saved page {} to {}", page.number(), path.display());
                page.set_progress(100);
                page.set_status(PageStatus::Ready);
                PageOutcome::Fetched
            }
            Err(e) => {
                warn!("Page {} failed: {}", page.number(), e);
                page.set_progress(0);
                page.set_status(PageStatus::Error);
                PageOutcome::Failed
            }
        }
    }

    async fn fetch_page(
        &self,
        source: &Arc<dyn HttpSource>,
        page: &Page,
        tmp_dir: &Path,
        base: &str,
    ) -> DownloadResult<PathBuf> {
        if page.image_url().is_none() {
            page.set_status(PageStatus::LoadPage);
            let url = source.get_image_url(page).await?;
            page.set_image_url(Some(url));
        }

        page.set_status(PageStatus::DownloadImage);
        page.set_progress(0);
        let response = self.fetch_with_retry(source, page).await?;

        let ext = page_extension(response.content_type.as_deref(), &response.bytes);
        let temp_path = tmp_dir.join(format!("{}{}", base, TEMP_FILE_SUFFIX));
        let final_path = tmp_dir.join(format!("{}.{}", base, ext));
        tokio::fs::write(&temp_path, &response.bytes).await?;
        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|_| DownloadError::AtomicOperationFailed {
                temp_path: temp_path.clone(),
                final_path: final_path.clone(),
            })?;
        Ok(final_path)
    }

    async fn fetch_with_retry(&self, source: &Arc<dyn HttpSource>, page: &Page) -> SourceResult<ImageResponse> {
        let mut retry_count = 0;
        loop {
            match source.fetch_image(page).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && retry_count < self.config.max_retries => {
                    let delay = BackoffCalculator::calculate_retry_delay(
                        retry_count,
                        self.config.retry_base_delay,
                        self.config.retry_max_delay,
                        self.config.retry_backoff_multiplier,
                    );
                    retry_count += 1;
                    debug!(
                        "Page {} failed ({}), retry {} in {:?}",
                        page.number(),
                        e,
                        retry_count,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move a complete staging directory to its final place
    async fn finalise(
        &self,
        download: &Download,
        manga_dir: &Path,
        tmp_dir: &Path,
        chapter_dir_name: &str,
        total: usize,
    ) -> DownloadResult<()> {
        let files = list_page_files(tmp_dir).await?;
        if files.len() != total {
            return Err(DownloadError::IncompleteChapter {
                downloaded: files.len(),
                total,
            });
        }

        let finished_name = if self.prefs.save_chapters_as_cbz {
            let archive = manga_dir.join(format!("{}.{}", chapter_dir_name, CBZ_EXTENSION));
            let source_dir = tmp_dir.to_path_buf();
            tokio::task::spawn_blocking(move || write_cbz(&source_dir, &archive))
                .await
                .map_err(|e| DownloadError::Io(std::io::Error::other(e)))??;
            tokio::fs::remove_dir_all(tmp_dir).await?;
            format!("{}.{}", chapter_dir_name, CBZ_EXTENSION)
        } else {
            let final_dir = manga_dir.join(chapter_dir_name);
            tokio::fs::rename(tmp_dir, &final_dir)
                .await
                .map_err(|_| DownloadError::AtomicOperationFailed {
                    temp_path: tmp_dir.to_path_buf(),
                    final_path: final_dir.clone(),
                })?;
            chapter_dir_name.to_string()
        };

        self.cache.add_chapter(&finished_name, &download.manga);
        download.set_status(DownloadStatus::Downloaded);
        Ok(())
    }
}

/// `001`, `002`, ... for pages 1, 2, ...
fn page_file_stem(page: &Page) -> String {
    format!("{:03}", page.number())
}

/// Finished page files in a staging directory, keyed by file stem
async fn list_page_files(dir: &Path) -> std::io::Result<HashMap<String, String>> {
    let mut files = HashMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.ends_with(TEMP_FILE_SUFFIX) {
            continue;
        }
        if let Some((stem, _)) = name.split_once('.') {
            files.insert(stem.to_string(), name);
        }
    }
    Ok(files)
}

/// Delete `*.tmp` files left by an interrupted run
async fn remove_partial_files(dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(TEMP_FILE_SUFFIX) {
            debug!("Removing partial page {}", entry.path().display());
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

/// Pack the files of `dir` into a STORED zip at `archive`, via `<archive>.tmp`
fn write_cbz(dir: &Path, archive: &Path) -> DownloadResult<()> {
    let archive_error = |reason: String| DownloadError::ArchiveWrite {
        path: archive.to_path_buf(),
        reason,
    };

    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort_by(|a, b| natural_cmp(a, b));

    let temp_path = PathBuf::from(format!("{}{}", archive.display(), TEMP_FILE_SUFFIX));
    let file = std::fs::File::create(&temp_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    for name in &names {
        let bytes = std::fs::read(dir.join(name))?;
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| archive_error(e.to_string()))?;
        writer.write_all(&bytes)?;
    }
    writer.finish().map_err(|e| archive_error(e.to_string()))?;

    std::fs::rename(&temp_path, archive).map_err(|_| DownloadError::AtomicOperationFailed {
        temp_path: temp_path.clone(),
        final_path: archive.to_path_buf(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::CacheConfig;
    use crate::app::models::ChapterInfo;
    use crate::app::source::InMemorySourceManager;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// Serves `pages` pages; pages listed in `failing` fail until `heal` is called
    #[derive(Debug, Default)]
    struct ScriptedSource {
        pages: usize,
        failing: Mutex<HashSet<usize>>,
        fetches: Mutex<Vec<usize>>,
        delay: Option<Duration>,
        started: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                ..Default::default()
            }
        }

        fn failing(self, index: usize) -> Self {
            self.failing.lock().unwrap().insert(index);
            self
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn fetches(&self) -> Vec<usize> {
            let mut fetches = self.fetches.lock().unwrap().clone();
            fetches.sort();
            fetches
        }
    }

    #[async_trait]
    impl HttpSource for ScriptedSource {
        fn id(&self) -> i64 {
            1
        }
        fn name(&self) -> &str {
            "Scripted"
        }
        fn lang(&self) -> &str {
            "en"
        }
        async fn get_chapter_list(&self, _manga: &Manga) -> SourceResult<Vec<ChapterInfo>> {
            Ok(Vec::new())
        }
        async fn get_page_list(&self, chapter: &Chapter) -> SourceResult<Vec<Page>> {
            Ok((0..self.pages)
                .map(|i| Page::new(i, format!("{}/{}", chapter.url, i), Some(format!("img/{i}"))))
                .collect())
        }
        async fn fetch_image(&self, page: &Page) -> SourceResult<ImageResponse> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.fetches.lock().unwrap().push(page.index());
            if self.failing.lock().unwrap().contains(&page.index()) {
                return Err(SourceError::ServerError { status: 500 });
            }
            Ok(ImageResponse {
                bytes: Bytes::from_static(PNG),
                content_type: Some("image/png".to_string()),
            })
        }
    }

    struct Fixture {
        _temp: TempDir,
        provider: Arc<DownloadProvider>,
        downloader: Downloader,
        manga: Manga,
        source: Arc<ScriptedSource>,
    }

    fn fixture(source: ScriptedSource, cbz: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut prefs = DownloadPreferences::with_root(temp.path());
        prefs.save_chapters_as_cbz = cbz;
        prefs.page_concurrency = 2;
        let provider = Arc::new(DownloadProvider::new(temp.path()));
        let source = Arc::new(source);
        let sources = Arc::new(InMemorySourceManager::new());
        sources.register(Source::Http(source.clone()));
        let cache = Arc::new(DownloadCache::new(
            Arc::clone(&provider),
            sources.clone(),
            CacheConfig::default(),
        ));
        let config = crate::app::worker::WorkerConfigBuilder::new()
            .max_retries(1)
            .retry_base_delay(Duration::ZERO)
            .retry_max_delay(Duration::ZERO)
            .build()
            .unwrap();
        let downloader = Downloader::new(
            config,
            prefs,
            Arc::clone(&provider),
            cache,
            Arc::new(DownloadQueue::new()),
            sources,
        )
        .unwrap();
        Fixture {
            _temp: temp,
            provider,
            downloader,
            manga: Manga::new(1, 1, "/m/1", "Manga"),
            source,
        }
    }

    async fn wait_until_stopped(downloader: &Downloader) {
        for _ in 0..500 {
            if !downloader.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("downloader did not stop");
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_worker_task_is_send() {
        let f = fixture(ScriptedSource::new(1), false);
        let run = Arc::clone(&f.downloader.worker).run();
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_start_requires_queue() {
        let f = fixture(ScriptedSource::new(1), false);
        assert!(!f.downloader.start());
        assert!(!f.downloader.is_running());
    }

    #[tokio::test]
    async fn test_chapter_is_finalised_as_directory() {
        let f = fixture(ScriptedSource::new(3), false);
        let mut events = f.downloader.subscribe();
        let chapter = Chapter::new(10, 1, "/c/10", "Ch 10");
        assert_eq!(f.downloader.queue_chapters(&f.manga, &[chapter.clone()], true).await, 1);

        wait_until_stopped(&f.downloader).await;
        assert!(f.downloader.queue().is_empty());

        let source = Source::Http(f.source.clone());
        let dir = f.provider.find_chapter_dir(&chapter, &f.manga, &source).await.unwrap();
        let mut files: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["001.png", "002.png", "003.png"]);
        assert!(f.provider.find_temp_chapter_dirs(&[chapter], &f.manga, &source).await.is_empty());

        assert_eq!(events.recv().await.unwrap(), DownloaderEvent::Started);
        assert_eq!(
            events.recv().await.unwrap(),
            DownloaderEvent::ChapterCompleted { chapter_id: 10 }
        );
    }

    #[tokio::test]
    async fn test_chapter_is_finalised_as_cbz() {
        let f = fixture(ScriptedSource::new(2), true);
        let chapter = Chapter::new(10, 1, "/c/10", "Ch 10");
        f.downloader.queue_chapters(&f.manga, &[chapter.clone()], true).await;
        wait_until_stopped(&f.downloader).await;

        let source = Source::Http(f.source.clone());
        let archive = f.provider.find_chapter_dir(&chapter, &f.manga, &source).await.unwrap();
        assert_eq!(archive.extension().unwrap(), "cbz");

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let entry = zip.by_index(0).unwrap();
        assert_eq!(entry.name(), "001.png");
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    }

    #[tokio::test]
    async fn test_failed_page_marks_chapter_error_and_resumes() {
        let f = fixture(ScriptedSource::new(3).failing(1), false);
        let chapter = Chapter::new(10, 1, "/c/10", "Ch 10");
        f.downloader.queue_chapters(&f.manga, &[chapter.clone()], true).await;
        wait_until_stopped(&f.downloader).await;

        let download = f.downloader.queue().find(10).unwrap();
        assert_eq!(download.status(), DownloadStatus::Error);
        assert_eq!(download.downloaded_images(), 2);
        // One attempt plus one retry for the failing page
        assert_eq!(f.source.fetches(), vec![0, 1, 1, 2]);

        let source = Source::Http(f.source.clone());
        let tmp = f.provider.find_temp_chapter_dirs(&[chapter.clone()], &f.manga, &source).await;
        assert_eq!(tmp.len(), 1);
        assert!(tmp[0].join("001.png").exists());
        assert!(!tmp[0].join("002.png").exists());
        assert!(tmp[0].join("003.png").exists());

        f.source.heal();
        f.source.fetches.lock().unwrap().clear();
        assert!(f.downloader.start());
        wait_until_stopped(&f.downloader).await;

        assert_eq!(f.source.fetches(), vec![1]);
        assert_eq!(download.status(), DownloadStatus::Downloaded);
        assert!(f.provider.find_chapter_dir(&chapter, &f.manga, &source).await.is_some());
    }

    #[tokio::test]
    async fn test_queue_chapters_skips_queued_and_downloaded() {
        let f = fixture(ScriptedSource::new(1), false);
        let source = Source::Http(f.source.clone());
        let manga_dir = f.provider.get_manga_dir(&f.manga, &source).await.unwrap();
        std::fs::create_dir(manga_dir.join("Ch 1")).unwrap();

        let chapters: Vec<Chapter> = (1..=3)
            .map(|i| Chapter::new(i, 1, format!("/c/{i}"), format!("Ch {i}")))
            .collect();
        assert_eq!(f.downloader.queue_chapters(&f.manga, &chapters, false).await, 2);
        assert_eq!(f.downloader.queue_chapters(&f.manga, &chapters, false).await, 0);
        assert_eq!(f.downloader.queue().chapter_ids(), vec![2, 3]);
        assert!(!f.downloader.is_running());
    }

    #[tokio::test]
    async fn test_pause_requeues_and_keeps_staging() {
        let mut source = ScriptedSource::new(6);
        source.delay = Some(Duration::from_millis(50));
        let f = fixture(source, false);
        let chapter = Chapter::new(10, 1, "/c/10", "Ch 10");
        f.downloader.queue_chapters(&f.manga, &[chapter], true).await;

        while f.source.started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        f.downloader.pause().await;

        assert!(!f.downloader.is_running());
        let download = f.downloader.queue().find(10).unwrap();
        assert_eq!(download.status(), DownloadStatus::Queue);
        assert!(download.downloaded_images() < 6);
    }

    /// Remote source whose images come from a local HTTP server
    #[derive(Debug)]
    struct ServerSource {
        base: String,
        handler: crate::app::client::HttpHandler,
    }

    #[async_trait]
    impl HttpSource for ServerSource {
        fn id(&self) -> i64 {
            1
        }
        fn name(&self) -> &str {
            "Server"
        }
        fn lang(&self) -> &str {
            "en"
        }
        async fn get_chapter_list(&self, _manga: &Manga) -> SourceResult<Vec<ChapterInfo>> {
            Ok(Vec::new())
        }
        async fn get_page_list(&self, chapter: &Chapter) -> SourceResult<Vec<Page>> {
            Ok(vec![Page::new(0, chapter.url.clone(), Some(format!("{}/0.png", self.base)))])
        }
        fn http_handler(&self) -> Option<&crate::app::client::HttpHandler> {
            Some(&self.handler)
        }
    }

    #[tokio::test]
    async fn test_failing_page_is_requested_once_per_attempt() {
        use crate::app::client::http::test_server;

        let (base, hits) = test_server::serve(test_server::response(
            "503 Service Unavailable",
            "text/plain",
            b"",
        ))
        .await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let handler = crate::app::client::HttpHandler::new(client, 1000).unwrap();

        let temp = TempDir::new().unwrap();
        let provider = Arc::new(DownloadProvider::new(temp.path()));
        let sources = Arc::new(InMemorySourceManager::new());
        sources.register(Source::Http(Arc::new(ServerSource { base, handler })));
        let cache = Arc::new(DownloadCache::new(
            Arc::clone(&provider),
            sources.clone(),
            CacheConfig::default(),
        ));
        let config = crate::app::worker::WorkerConfigBuilder::new()
            .max_retries(1)
            .retry_base_delay(Duration::ZERO)
            .retry_max_delay(Duration::ZERO)
            .build()
            .unwrap();
        let downloader = Downloader::new(
            config,
            DownloadPreferences::with_root(temp.path()),
            provider,
            cache,
            Arc::new(DownloadQueue::new()),
            sources,
        )
        .unwrap();

        let manga = Manga::new(1, 1, "/m/1", "Manga");
        let chapter = Chapter::new(10, 1, "/c/10", "Ch 10");
        downloader.queue_chapters(&manga, &[chapter], true).await;
        wait_until_stopped(&downloader).await;

        assert_eq!(downloader.queue().find(10).unwrap().status(), DownloadStatus::Error);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_and_clear() {
        let f = fixture(ScriptedSource::new(1), false);
        let chapters: Vec<Chapter> = (1..=2)
            .map(|i| Chapter::new(i, 1, format!("/c/{i}"), format!("Ch {i}")))
            .collect();
        f.downloader.queue_chapters(&f.manga, &chapters, false).await;
        let mut events = f.downloader.subscribe();

        f.downloader.stop(Some("No network".to_string()));
        assert_eq!(
            events.recv().await.unwrap(),
            DownloaderEvent::Stopped {
                reason: Some("No network".to_string())
            }
        );

        f.downloader.clear_queue_for_manga(&Manga::new(2, 1, "/m/2", "Other"), false);
        assert_eq!(f.downloader.queue().len(), 2);
        f.downloader.clear_queue_for_manga(&f.manga, false);
        assert!(f.downloader.queue().is_empty());
    }
}
