//! Download queue behaviour through the public manager API

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use manga_fetcher::app::loader::ChapterLoader;
use manga_fetcher::app::models::{Chapter, Manga};
use manga_fetcher::app::reader::ReaderChapter;
use manga_fetcher::app::source::InMemoryLibrary;
use manga_fetcher::app::worker::DownloaderEvent;

use support::{page_bytes, wait_for_event, wait_until_idle, Harness, ScriptedSource, SOURCE_ID};

#[tokio::test]
async fn start_download_now_moves_chapter_to_front() {
    let harness = Harness::new(ScriptedSource::new(2));
    let mut events = harness.manager.subscribe_events();
    let chapters = harness.chapters(&[1, 2, 3]);

    assert_eq!(harness.manager.download_chapters(&harness.manga, &chapters, false).await, 3);
    assert_eq!(harness.manager.queue().chapter_ids(), vec![1, 2, 3]);
    assert!(harness.manager.start_download_now(3).await);

    assert_eq!(harness.manager.queue().chapter_ids(), vec![3, 1, 2]);
    assert!(harness.manager.is_running());

    let mut completed = Vec::new();
    while completed.len() < 3 {
        let event = wait_for_event(&mut events, |event| {
            matches!(event, DownloaderEvent::ChapterCompleted { .. })
        })
        .await;
        completed.extend(event.chapter_id());
    }
    assert_eq!(completed, vec![3, 1, 2]);
    wait_until_idle(&mut events).await;
    assert!(!harness.manager.has_queue());
}

#[tokio::test]
async fn start_download_now_ignores_unknown_chapter() {
    let harness = Harness::new(ScriptedSource::new(1));
    harness
        .manager
        .download_chapters(&harness.manga, &harness.chapters(&[1]), false)
        .await;

    assert!(!harness.manager.start_download_now(9).await);
    assert!(harness.manager.is_paused());
}

#[tokio::test]
async fn reorder_keeps_running_state() {
    let harness = Harness::new(ScriptedSource::new(2));
    let mut events = harness.manager.subscribe_events();
    harness
        .manager
        .download_chapters(&harness.manga, &harness.chapters(&[1, 2]), false)
        .await;

    let order = harness.manager.queue().snapshot().to_vec();
    harness.manager.reorder_queue(order).await;
    assert!(harness.manager.is_paused());
    assert_eq!(harness.manager.queue().chapter_ids(), vec![1, 2]);

    assert!(harness.manager.start_downloads());
    let order = harness.manager.queue().snapshot().to_vec();
    harness.manager.reorder_queue(order).await;
    assert!(harness.manager.is_running());
    assert_eq!(harness.manager.queue().chapter_ids(), vec![1, 2]);

    wait_until_idle(&mut events).await;
}

#[tokio::test]
async fn reorder_with_nothing_clears_queue() {
    let harness = Harness::new(ScriptedSource::new(1));
    harness
        .manager
        .download_chapters(&harness.manga, &harness.chapters(&[1, 2]), false)
        .await;

    harness.manager.reorder_queue(Vec::new()).await;
    assert!(!harness.manager.has_queue());
    assert!(!harness.manager.is_running());
}

#[tokio::test]
async fn chapters_are_queued_once() {
    let harness = Harness::new(ScriptedSource::new(1));
    let manager = &harness.manager;

    assert_eq!(
        manager.download_chapters(&harness.manga, &harness.chapters(&[1, 2, 3]), false).await,
        3
    );
    assert_eq!(
        manager.download_chapters(&harness.manga, &harness.chapters(&[2, 3, 4]), false).await,
        1
    );
    assert_eq!(manager.queue().chapter_ids(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn downloaded_chapters_are_not_queued_again() {
    let harness = Harness::new(ScriptedSource::new(2));
    let mut events = harness.manager.subscribe_events();
    let chapters = harness.chapters(&[1]);

    harness.manager.download_chapters(&harness.manga, &chapters, true).await;
    wait_until_idle(&mut events).await;

    assert_eq!(harness.manager.download_chapters(&harness.manga, &chapters, false).await, 0);
    assert!(!harness.manager.has_queue());
}

#[tokio::test]
async fn downloaded_directory_loads_without_network() {
    let harness = Harness::new(ScriptedSource::new(12));
    let mut events = harness.manager.subscribe_events();
    let chapter = harness.chapters(&[1]).remove(0);

    harness
        .manager
        .download_chapters(&harness.manga, std::slice::from_ref(&chapter), true)
        .await;
    wait_until_idle(&mut events).await;
    assert_eq!(harness.source.fetch_count(), 12);
    assert!(harness.manager.is_chapter_downloaded(&chapter, &harness.manga, false).await);

    let loader = ChapterLoader::new(Arc::clone(&harness.manager), harness.manga.clone(), harness.remote());
    let reader = ReaderChapter::new(chapter.clone());
    reader.add_ref();
    loader.load_chapter(&reader).await.unwrap();

    assert_eq!(reader.page_loader().unwrap().kind(), "download");
    let pages = reader.pages().unwrap();
    assert_eq!(pages.len(), 12);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.read().await.unwrap().as_ref(), page_bytes(&chapter.url, i).as_slice());
    }
    assert_eq!(harness.source.fetch_count(), 12);
    reader.unref();
}

#[tokio::test]
async fn downloaded_archive_loads_in_order() {
    let harness = Harness::with_prefs(ScriptedSource::new(3), |prefs| prefs.save_chapters_as_cbz = true);
    let mut events = harness.manager.subscribe_events();
    let chapter = harness.chapters(&[1]).remove(0);

    harness
        .manager
        .download_chapters(&harness.manga, std::slice::from_ref(&chapter), true)
        .await;
    wait_until_idle(&mut events).await;

    let dir = harness
        .manager
        .provider()
        .find_chapter_dir(&chapter, &harness.manga, &harness.remote())
        .await
        .unwrap();
    assert!(dir.is_file());
    assert_eq!(dir.extension().and_then(|e| e.to_str()), Some("cbz"));

    let loader = ChapterLoader::new(Arc::clone(&harness.manager), harness.manga.clone(), harness.remote());
    let reader = ReaderChapter::new(chapter.clone());
    reader.add_ref();
    loader.load_chapter(&reader).await.unwrap();

    let pages = reader.pages().unwrap();
    assert_eq!(pages.len(), 3);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.read().await.unwrap().as_ref(), page_bytes(&chapter.url, i).as_slice());
    }

    let page_loader = reader.page_loader().unwrap();
    reader.unref();
    assert!(page_loader.is_recycled());
}

#[tokio::test]
async fn deleting_chapters_updates_cache() {
    let harness = Harness::new(ScriptedSource::new(2));
    let mut events = harness.manager.subscribe_events();
    let chapters = harness.chapters(&[1, 2]);

    harness.manager.download_chapters(&harness.manga, &chapters, true).await;
    wait_until_idle(&mut events).await;
    assert_eq!(harness.manager.get_download_count(&harness.manga, false).await, 2);

    let deleted = harness
        .manager
        .delete_chapters(&chapters[..1], &harness.manga, &harness.remote(), false)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);

    assert!(!harness.manager.is_chapter_downloaded(&chapters[0], &harness.manga, false).await);
    assert!(!harness.manager.is_chapter_downloaded(&chapters[0], &harness.manga, true).await);
    assert!(harness.manager.is_chapter_downloaded(&chapters[1], &harness.manga, false).await);
    assert_eq!(harness.manager.get_download_count(&harness.manga, false).await, 1);
}

#[tokio::test]
async fn bookmarked_chapters_survive_deletion() {
    let harness = Harness::new(ScriptedSource::new(1));
    let mut events = harness.manager.subscribe_events();
    let mut chapters = harness.chapters(&[1]);
    chapters[0].bookmark = true;

    harness.manager.download_chapters(&harness.manga, &chapters, true).await;
    wait_until_idle(&mut events).await;

    let deleted = harness
        .manager
        .delete_chapters(&chapters, &harness.manga, &harness.remote(), false)
        .await
        .unwrap();
    assert!(deleted.is_empty());
    assert!(harness.manager.is_chapter_downloaded(&chapters[0], &harness.manga, true).await);
}

#[tokio::test]
async fn queue_is_restored_after_restart() {
    let harness = Harness::new(ScriptedSource::new(1));
    let chapters = harness.chapters(&[5, 6, 7]);
    harness.manager.download_chapters(&harness.manga, &chapters, false).await;
    harness.manager.start_download_now(7).await;
    harness.manager.pause_downloads().await;
    let expected = harness.manager.queue().chapter_ids();
    harness.manager.persist_queue().await.unwrap();

    let library = InMemoryLibrary::new();
    library.insert_manga(harness.manga.clone());
    // Chapter 6 was removed from the library meanwhile
    library.insert_chapters(chapters.iter().filter(|c| c.id != 6).cloned());

    let harness = harness.reopen(ScriptedSource::new(1));
    assert!(!harness.manager.has_queue());
    assert_eq!(harness.manager.restore_queue(&library).await.unwrap(), expected.len() - 1);

    let restored = harness.manager.queue().chapter_ids();
    let expected: Vec<i64> = expected.into_iter().filter(|id| *id != 6).collect();
    assert_eq!(restored, expected);
    assert!(harness.manager.is_paused());
}

#[tokio::test]
async fn long_multibyte_titles_download() {
    let harness = Harness::with_prefs(ScriptedSource::new(2), |prefs| prefs.save_chapters_as_cbz = true);
    let mut events = harness.manager.subscribe_events();
    let manga = Manga::new(7, SOURCE_ID, "/manga/7", "漫".repeat(120));
    let chapter = Chapter::new(70, manga.id, "/chapter/70", "章".repeat(120));

    assert_eq!(
        harness
            .manager
            .download_chapters(&manga, std::slice::from_ref(&chapter), true)
            .await,
        1
    );
    let event = wait_for_event(&mut events, |event| {
        matches!(
            event,
            DownloaderEvent::ChapterCompleted { .. } | DownloaderEvent::ChapterFailed { .. }
        )
    })
    .await;

    assert_eq!(event, DownloaderEvent::ChapterCompleted { chapter_id: 70 });
    assert!(harness.manager.is_chapter_downloaded(&chapter, &manga, true).await);
}

#[tokio::test]
async fn clearing_the_queue_removes_staging_directories() {
    let harness = Harness::new(ScriptedSource::new(1));
    let chapters = harness.chapters(&[1, 2]);
    harness.manager.download_chapters(&harness.manga, &chapters, false).await;

    let manga_dir = harness
        .manager
        .provider()
        .get_manga_dir(&harness.manga, &harness.remote())
        .await
        .unwrap();
    let staging = manga_dir.join("Chapter 1_tmp");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("001.png"), page_bytes(&chapters[0].url, 0)).unwrap();

    harness.manager.clear_queue(false).await.unwrap();

    assert!(!harness.manager.has_queue());
    assert!(!staging.exists());
}
