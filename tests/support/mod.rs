//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::broadcast;

use manga_fetcher::app::cache::CacheConfig;
use manga_fetcher::app::client::ImageResponse;
use manga_fetcher::app::download::{DownloadManager, DownloadPreferences};
use manga_fetcher::app::models::{Chapter, ChapterInfo, Manga};
use manga_fetcher::app::page::Page;
use manga_fetcher::app::source::{HttpSource, InMemorySourceManager, Source};
use manga_fetcher::app::worker::{DownloaderEvent, WorkerConfigBuilder};
use manga_fetcher::errors::SourceResult;

pub const SOURCE_ID: i64 = 100;

/// Page `i` of every chapter: a PNG signature followed by the chapter id and index
pub fn page_bytes(chapter_url: &str, index: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
    bytes.extend_from_slice(format!("{}#{}", chapter_url, index).as_bytes());
    bytes
}

/// Remote source serving `pages` pages per chapter, optionally slowly
#[derive(Debug)]
pub struct ScriptedSource {
    pub pages: usize,
    pub delay: Option<Duration>,
    pub fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn slow(pages: usize, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(pages)
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpSource for ScriptedSource {
    fn id(&self) -> i64 {
        SOURCE_ID
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
            .map(|i| Page::new(i, format!("{}/{}", chapter.url, i), Some(format!("{}#{}", chapter.url, i))))
            .collect())
    }

    async fn fetch_image(&self, page: &Page) -> SourceResult<ImageResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let url = page.image_url().unwrap_or_default();
        let (chapter_url, index) = url.rsplit_once('#').unwrap_or((url.as_str(), "0"));
        Ok(ImageResponse {
            bytes: Bytes::from(page_bytes(chapter_url, index.parse().unwrap_or(0))),
            content_type: Some("image/png".to_string()),
        })
    }
}

/// A download manager rooted in a temporary directory with one remote source
pub struct Harness {
    pub temp: TempDir,
    pub manager: Arc<DownloadManager>,
    pub sources: Arc<InMemorySourceManager>,
    pub source: Arc<ScriptedSource>,
    pub manga: Manga,
}

impl Harness {
    pub fn new(source: ScriptedSource) -> Self {
        Self::with_prefs(source, |_| {})
    }

    pub fn with_prefs(source: ScriptedSource, configure: impl FnOnce(&mut DownloadPreferences)) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let mut prefs = DownloadPreferences::with_root(temp.path().join("downloads"));
        configure(&mut prefs);
        Self::at(temp, prefs, source)
    }

    /// A second manager over the same directory, as after a restart
    pub fn reopen(self, source: ScriptedSource) -> Self {
        let prefs = self.manager.preferences().clone();
        Self::at(self.temp, prefs, source)
    }

    fn at(temp: TempDir, prefs: DownloadPreferences, source: ScriptedSource) -> Self {
        let source = Arc::new(source);
        let sources = Arc::new(InMemorySourceManager::new());
        sources.register(Source::Http(source.clone()));

        let worker = WorkerConfigBuilder::new()
            .max_retries(1)
            .retry_base_delay(Duration::ZERO)
            .retry_max_delay(Duration::ZERO)
            .build()
            .expect("worker config");
        let manager = DownloadManager::new(prefs, worker, CacheConfig::default(), sources.clone())
            .expect("download manager");

        Self {
            temp,
            manager: Arc::new(manager),
            sources,
            source,
            manga: Manga::new(1, SOURCE_ID, "/manga/1", "Test Manga"),
        }
    }

    pub fn remote(&self) -> Source {
        Source::Http(self.source.clone())
    }

    pub fn chapters(&self, ids: &[i64]) -> Vec<Chapter> {
        ids.iter()
            .map(|id| Chapter::new(*id, self.manga.id, format!("/chapter/{}", id), format!("Chapter {}", id)))
            .collect()
    }
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<DownloaderEvent>,
    predicate: F,
) -> DownloaderEvent
where
    F: Fn(&DownloaderEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for downloader event")
}

/// Wait until the downloader reports the whole queue done
pub async fn wait_until_idle(events: &mut broadcast::Receiver<DownloaderEvent>) {
    wait_for_event(events, |event| matches!(event, DownloaderEvent::Stopped { .. })).await;
}
