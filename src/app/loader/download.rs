//! Pages of a chapter that was downloaded to disk

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::zip::ZipPageLoader;
use crate::app::download::DownloadManager;
use crate::app::models::{Chapter, Manga};
use crate::app::observe::lock;
use crate::app::page::Page;
use crate::app::source::Source;
use crate::errors::{LoaderError, LoaderResult};

/// Loader for downloaded chapters, stored either as a directory or a `.cbz`
#[derive(Debug)]
pub struct DownloadPageLoader {
    manager: Arc<DownloadManager>,
    manga: Manga,
    chapter: Chapter,
    source: Source,
    archive: Mutex<Option<ZipPageLoader>>,
    recycled: AtomicBool,
}

impl DownloadPageLoader {
    pub fn new(manager: Arc<DownloadManager>, manga: Manga, chapter: Chapter, source: Source) -> Self {
        Self {
            manager,
            manga,
            chapter,
            source,
            archive: Mutex::new(None),
            recycled: AtomicBool::new(false),
        }
    }

    pub async fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        if self.is_recycled() {
            return Err(LoaderError::Recycled);
        }
        let path = self
            .manager
            .provider()
            .find_chapter_dir(&self.chapter, &self.manga, &self.source)
            .await
            .ok_or(LoaderError::NoPagesFound)?;

        if tokio::fs::metadata(&path).await?.is_file() {
            debug!("Reading downloaded archive {}", path.display());
            let archive = ZipPageLoader::open(&path).await?;
            let pages = archive.get_pages().await?;
            self.install_archive(archive)?;
            return Ok(pages);
        }

        self.manager
            .build_page_list(&self.source, &self.manga, &self.chapter)
            .await
    }

    /// Keep an opened archive until recycled
    ///
    /// `recycle` raises the flag before taking the lock, so an archive that
    /// arrives after it is closed here instead of being stored.
    fn install_archive(&self, archive: ZipPageLoader) -> LoaderResult<()> {
        let mut slot = lock(&self.archive);
        if self.is_recycled() {
            archive.recycle();
            return Err(LoaderError::Recycled);
        }
        if let Some(previous) = slot.replace(archive) {
            previous.recycle();
        }
        Ok(())
    }

    pub fn recycle(&self) {
        self.recycled.store(true, Ordering::SeqCst);
        if let Some(archive) = lock(&self.archive).take() {
            archive.recycle();
        }
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::CacheConfig;
    use crate::app::download::DownloadPreferences;
    use crate::app::worker::WorkerConfig;
    use crate::app::download::model::test_support::OfflineSource;
    use crate::app::loader::archive::zip_bytes;
    use crate::app::source::InMemorySourceManager;
    use tempfile::TempDir;

    fn loader(temp: &TempDir) -> DownloadPageLoader {
        let prefs = DownloadPreferences::with_root(temp.path().join("downloads"));
        let sources = Arc::new(InMemorySourceManager::new());
        let source = Source::Http(Arc::new(OfflineSource));
        sources.register(source.clone());
        let manager =
            DownloadManager::new(prefs, WorkerConfig::default(), CacheConfig::default(), sources)
                .unwrap();
        DownloadPageLoader::new(
            Arc::new(manager),
            Manga::new(1, 1, "/m/1", "Manga"),
            Chapter::new(1, 1, "/c/1", "Ch 1"),
            source,
        )
    }

    async fn open_archive(temp: &TempDir) -> ZipPageLoader {
        let path = temp.path().join("Ch 1.cbz");
        std::fs::write(&path, zip_bytes(&[("001.png", b"one")])).unwrap();
        ZipPageLoader::open(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_archive_opened_after_recycle_is_closed() {
        let temp = TempDir::new().unwrap();
        let loader = loader(&temp);
        let archive = open_archive(&temp).await;

        loader.recycle();
        assert!(matches!(
            loader.install_archive(archive.clone()),
            Err(LoaderError::Recycled)
        ));
        assert!(archive.is_recycled());
        assert!(lock(&loader.archive).is_none());
    }

    #[tokio::test]
    async fn test_installed_archive_is_closed_on_recycle() {
        let temp = TempDir::new().unwrap();
        let loader = loader(&temp);
        let archive = open_archive(&temp).await;

        loader.install_archive(archive.clone()).unwrap();
        assert!(!archive.is_recycled());

        loader.recycle();
        assert!(archive.is_recycled());
    }
}
