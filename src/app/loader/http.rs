//! Pages fetched from a remote source on demand

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::app::models::Chapter;
use crate::app::page::{Page, PageStatus, PageStream};
use crate::app::source::HttpSource;
use crate::errors::{LoaderError, LoaderResult, SourceResult};

/// Loader for a chapter that is read straight from its source
///
/// Page bytes are only fetched when [`HttpPageLoader::load_page`] is called.
/// Recycling cancels every fetch still in flight and puts the interrupted
/// pages back in the queue state.
#[derive(Debug)]
pub struct HttpPageLoader {
    source: Arc<dyn HttpSource>,
    chapter: Chapter,
    cancel: watch::Sender<bool>,
}

impl HttpPageLoader {
    pub fn new(source: Arc<dyn HttpSource>, chapter: Chapter) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            source,
            chapter,
            cancel,
        }
    }

    pub fn source(&self) -> &Arc<dyn HttpSource> {
        &self.source
    }

    /// Ask the source for the chapter's page list
    pub async fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        if self.is_recycled() {
            return Err(LoaderError::Recycled);
        }
        let pages = self.source.get_page_list(&self.chapter).await?;
        debug!(
            "{} listed {} pages for chapter {}",
            self.source.name(),
            pages.len(),
            self.chapter.id
        );
        Ok(pages)
    }

    /// Fetch the bytes of one page unless it is already readable
    ///
    /// # Errors
    ///
    /// The source's error when resolving or fetching fails (the page is then
    /// left in `Error`), or `LoaderError::Recycled` if the loader is recycled
    /// before the fetch completes.
    pub async fn load_page(&self, page: &Page) -> LoaderResult<()> {
        if page.status() == PageStatus::Ready && page.stream().is_some() {
            return Ok(());
        }

        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            return Err(LoaderError::Recycled);
        }

        tokio::select! {
            result = self.fetch(page) => match result {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("Page {} of chapter {} failed: {}", page.number(), self.chapter.id, e);
                    page.set_status(PageStatus::Error);
                    Err(e.into())
                }
            },
            _ = cancelled.wait_for(|cancelled| *cancelled) => {
                page.set_status(PageStatus::Queue);
                page.set_progress(0);
                Err(LoaderError::Recycled)
            }
        }
    }

    /// Reset a failed page and fetch it again
    pub async fn retry_page(&self, page: &Page) -> LoaderResult<()> {
        if page.status() == PageStatus::Error {
            page.set_status(PageStatus::Queue);
            page.set_progress(0);
        }
        self.load_page(page).await
    }

    async fn fetch(&self, page: &Page) -> SourceResult<()> {
        if page.image_url().is_none() {
            page.set_status(PageStatus::LoadPage);
            let url = self.source.get_image_url(page).await?;
            page.set_image_url(Some(url));
        }

        page.set_status(PageStatus::DownloadImage);
        page.set_progress(0);
        let response = self.source.fetch_image(page).await?;
        page.set_stream(Some(PageStream::Memory(response.bytes)));
        page.set_progress(100);
        page.set_status(PageStatus::Ready);
        Ok(())
    }

    pub fn recycle(&self) {
        debug!("Cancelling page fetches for chapter {}", self.chapter.id);
        self.cancel.send_replace(true);
    }

    pub fn is_recycled(&self) -> bool {
        *self.cancel.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::ImageResponse;
    use crate::app::models::{ChapterInfo, Manga};
    use crate::errors::SourceError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct SlowSource {
        attempts: AtomicUsize,
        fail_first: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl HttpSource for SlowSource {
        fn id(&self) -> i64 {
            9
        }
        fn name(&self) -> &str {
            "Slow"
        }
        fn lang(&self) -> &str {
            "en"
        }
        async fn get_chapter_list(&self, _manga: &Manga) -> SourceResult<Vec<ChapterInfo>> {
            Ok(Vec::new())
        }
        async fn get_page_list(&self, _chapter: &Chapter) -> SourceResult<Vec<Page>> {
            Ok((0..2).map(|i| Page::new(i, format!("/p/{}", i), None)).collect())
        }
        async fn get_image_url(&self, page: &Page) -> SourceResult<String> {
            Ok(format!("https://img.example.org/{}.png", page.index()))
        }
        async fn fetch_image(&self, page: &Page) -> SourceResult<ImageResponse> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_first && attempt == 0 {
                return Err(SourceError::ServerError { status: 500 });
            }
            Ok(ImageResponse {
                bytes: Bytes::from(format!("image-{}", page.index())),
                content_type: Some("image/png".into()),
            })
        }
    }

    fn chapter() -> Chapter {
        Chapter::new(5, 1, "/c/5", "Chapter 5")
    }

    #[tokio::test]
    async fn test_load_page_resolves_and_fetches() {
        let loader = HttpPageLoader::new(Arc::new(SlowSource::default()), chapter());
        let pages = loader.get_pages().await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].status(), PageStatus::Queue);

        loader.load_page(&pages[1]).await.unwrap();
        assert_eq!(pages[1].status(), PageStatus::Ready);
        assert_eq!(
            pages[1].image_url().as_deref(),
            Some("https://img.example.org/1.png")
        );
        assert_eq!(pages[1].read().await.unwrap().as_ref(), b"image-1");
    }

    #[tokio::test]
    async fn test_retry_page_after_error() {
        let source = Arc::new(SlowSource {
            fail_first: true,
            ..Default::default()
        });
        let loader = HttpPageLoader::new(source.clone(), chapter());
        let pages = loader.get_pages().await.unwrap();

        assert!(loader.load_page(&pages[0]).await.is_err());
        assert_eq!(pages[0].status(), PageStatus::Error);

        loader.retry_page(&pages[0]).await.unwrap();
        assert_eq!(pages[0].status(), PageStatus::Ready);
        assert_eq!(source.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recycle_cancels_in_flight_fetch() {
        let source = Arc::new(SlowSource {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let loader = Arc::new(HttpPageLoader::new(source, chapter()));
        let pages = loader.get_pages().await.unwrap();
        let page = Arc::new(pages.into_iter().next().unwrap());

        let task = {
            let loader = Arc::clone(&loader);
            let page = Arc::clone(&page);
            tokio::spawn(async move { loader.load_page(&page).await })
        };
        while page.status() != PageStatus::DownloadImage {
            tokio::task::yield_now().await;
        }

        loader.recycle();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(LoaderError::Recycled)));
        assert_eq!(page.status(), PageStatus::Queue);
        assert!(matches!(
            loader.get_pages().await,
            Err(LoaderError::Recycled)
        ));
    }
}
