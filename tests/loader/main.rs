//! Chapter loading through `ChapterLoader` and reader chapter lifetimes

#[path = "../support/mod.rs"]
mod support;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use manga_fetcher::app::loader::ChapterLoader;
use manga_fetcher::app::models::{Chapter, Manga};
use manga_fetcher::app::reader::{ChapterState, ReaderChapter};
use manga_fetcher::app::source::local::LOCAL_SOURCE_ID;
use manga_fetcher::app::source::{LocalSource, Source};
use manga_fetcher::errors::LoaderError;

use support::{page_bytes, Harness, ScriptedSource};

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

struct Library {
    harness: Harness,
    manga: Manga,
    source: Source,
}

impl Library {
    fn new() -> Self {
        let harness = Harness::new(ScriptedSource::new(2));
        let root = harness.temp.path().join("library");
        std::fs::create_dir_all(root.join("Local Manga")).unwrap();
        Self {
            manga: Manga::new(2, LOCAL_SOURCE_ID, "Local Manga", "Local Manga"),
            source: Source::Local(Arc::new(LocalSource::new(root))),
            harness,
        }
    }

    fn manga_dir(&self) -> std::path::PathBuf {
        self.harness.temp.path().join("library").join("Local Manga")
    }

    fn chapter(&self, id: i64, file: &str) -> Chapter {
        Chapter::new(id, self.manga.id, format!("Local Manga/{}", file), file)
    }

    fn loader(&self) -> ChapterLoader {
        ChapterLoader::new(
            Arc::clone(&self.harness.manager),
            self.manga.clone(),
            self.source.clone(),
        )
    }
}

#[tokio::test]
async fn local_directory_pages_in_natural_order() {
    let library = Library::new();
    let dir = library.manga_dir().join("Chapter 1");
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["10.jpg", "2.jpg", "3.png", "notes.txt"] {
        std::fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    let reader = ReaderChapter::new(library.chapter(1, "Chapter 1"));
    reader.add_ref();
    library.loader().load_chapter(&reader).await.unwrap();

    assert_eq!(reader.page_loader().unwrap().kind(), "directory");
    let pages = reader.pages().unwrap();
    let mut contents = Vec::new();
    for page in pages.iter() {
        contents.push(String::from_utf8(page.read().await.unwrap().to_vec()).unwrap());
    }
    assert_eq!(contents, vec!["2.jpg", "3.png", "10.jpg"]);
    reader.unref();
}

#[tokio::test]
async fn local_zip_chapter() {
    let library = Library::new();
    write_zip(
        &library.manga_dir().join("Chapter 2.cbz"),
        &[
            ("p10.jpg", &b"ten"[..]),
            ("p9.jpg", &b"nine"[..]),
            ("ComicInfo.xml", &b"<ComicInfo/>"[..]),
        ],
    );

    let reader = ReaderChapter::new(library.chapter(2, "Chapter 2.cbz"));
    reader.add_ref();
    library.loader().load_chapter(&reader).await.unwrap();

    assert_eq!(reader.page_loader().unwrap().kind(), "zip");
    let pages = reader.pages().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].read().await.unwrap().as_ref(), b"nine");
    assert_eq!(pages[1].read().await.unwrap().as_ref(), b"ten");

    let page_loader = reader.page_loader().unwrap();
    reader.unref();
    assert!(page_loader.is_recycled());
    assert!(matches!(reader.state(), ChapterState::Wait));
}

#[tokio::test]
async fn empty_chapter_is_an_error() {
    let library = Library::new();
    std::fs::create_dir_all(library.manga_dir().join("Empty")).unwrap();

    let reader = ReaderChapter::new(library.chapter(3, "Empty"));
    let error = library.loader().load_chapter(&reader).await.unwrap_err();

    assert!(matches!(*error, LoaderError::NoPagesFound));
    assert!(matches!(reader.state(), ChapterState::Error(_)));
    assert!(reader.page_loader().is_none());
}

#[tokio::test]
async fn unknown_local_format_is_an_error() {
    let library = Library::new();
    std::fs::write(library.manga_dir().join("Chapter 4.pdf"), b"%PDF").unwrap();

    let reader = ReaderChapter::new(library.chapter(4, "Chapter 4.pdf"));
    let error = tokio_test::assert_err!(library.loader().load_chapter(&reader).await);
    assert!(matches!(*error, LoaderError::UnknownFormat { .. }));
}

#[tokio::test]
async fn missing_source_fails_with_its_id() {
    let harness = Harness::new(ScriptedSource::new(1));
    let manga = Manga::new(3, 777, "/gone", "Gone");
    let loader = ChapterLoader::new(
        Arc::clone(&harness.manager),
        manga.clone(),
        harness.manager.sources().get_or_stub(manga.source),
    );

    let reader = ReaderChapter::new(Chapter::new(30, manga.id, "/gone/1", "Chapter 1"));
    let error = loader.load_chapter(&reader).await.unwrap_err();

    assert!(matches!(*error, LoaderError::SourceNotInstalled { id: 777 }));
    match reader.state() {
        ChapterState::Error(state_error) => assert!(Arc::ptr_eq(&state_error, &error)),
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test]
async fn remote_chapter_loads_pages_on_demand() {
    let harness = Harness::new(ScriptedSource::new(3));
    let loader = ChapterLoader::new(Arc::clone(&harness.manager), harness.manga.clone(), harness.remote());
    let chapter = harness.chapters(&[1]).remove(0);

    let reader = ReaderChapter::new(chapter.clone());
    reader.add_ref();
    loader.load_chapter(&reader).await.unwrap();

    let page_loader = reader.page_loader().unwrap();
    assert_eq!(page_loader.kind(), "http");
    assert_eq!(harness.source.fetch_count(), 0);

    let pages = reader.pages().unwrap();
    page_loader.load_page(&pages[1]).await.unwrap();
    assert_eq!(harness.source.fetch_count(), 1);
    assert_eq!(pages[1].read().await.unwrap().as_ref(), page_bytes(&chapter.url, 1).as_slice());

    reader.unref();
    assert!(page_loader.is_recycled());
    assert!(matches!(
        page_loader.load_page(&pages[2]).await,
        Err(LoaderError::Recycled)
    ));
}

#[tokio::test]
async fn loading_twice_keeps_the_loader() {
    let library = Library::new();
    let dir = library.manga_dir().join("Chapter 5");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("1.jpg"), b"one").unwrap();

    let loader = library.loader();
    let reader = ReaderChapter::new(library.chapter(5, "Chapter 5"));
    reader.add_ref();
    tokio_test::assert_ok!(loader.load_chapter(&reader).await);
    let first = reader.page_loader().unwrap();

    tokio_test::assert_ok!(loader.load_chapter(&reader).await);
    assert!(Arc::ptr_eq(&first, &reader.page_loader().unwrap()));
    reader.unref();
}

#[tokio::test]
async fn requested_page_resumes_unread_chapters() {
    let library = Library::new();
    let dir = library.manga_dir().join("Chapter 6");
    std::fs::create_dir_all(&dir).unwrap();
    for i in 1..=3 {
        std::fs::write(dir.join(format!("{}.jpg", i)), b"x").unwrap();
    }

    let mut unread = library.chapter(6, "Chapter 6");
    unread.last_page_read = 10;
    let reader = ReaderChapter::new(unread);
    library.loader().load_chapter(&reader).await.unwrap();
    assert_eq!(reader.requested_page(), 2);

    let mut read = library.chapter(6, "Chapter 6");
    read.read = true;
    read.last_page_read = 1;
    let reader = ReaderChapter::new(read);
    library.loader().load_chapter(&reader).await.unwrap();
    assert_eq!(reader.requested_page(), 0);
}

#[tokio::test]
async fn loader_outlives_all_but_last_reference() {
    let library = Library::new();
    write_zip(&library.manga_dir().join("Chapter 7.zip"), &[("1.png", &b"a"[..])]);

    let reader = ReaderChapter::new(library.chapter(7, "Chapter 7.zip"));
    reader.add_ref();
    reader.add_ref();
    library.loader().load_chapter(&reader).await.unwrap();
    let page_loader = reader.page_loader().unwrap();

    reader.unref();
    assert!(!page_loader.is_recycled());
    assert!(reader.state().is_loaded());

    reader.unref();
    assert!(page_loader.is_recycled());
    assert_eq!(reader.ref_count(), 0);
}
