//! Command handlers for the Manga Fetcher CLI

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::app::cache::DownloadCache;
use crate::app::download::DownloadProvider;
use crate::app::loader::PageLoader;
use crate::app::page::PageStream;
use crate::app::source::{InMemorySourceManager, LocalFormat};
use crate::cli::{CacheArgs, PagesArgs};
use crate::config::AppConfig;
use crate::errors::Result;

/// Handle the pages command
///
/// Opens the chapter with the loader its format calls for, prints one line
/// per page and releases the loader.
pub async fn handle_pages(args: PagesArgs) -> Result<()> {
    let start_time = Instant::now();
    let format = LocalFormat::detect(&args.path).await?;
    debug!("Detected {:?}", format);

    let loader = PageLoader::open_local(format).await?;
    let pages = loader.get_pages().await;
    let pages = match pages {
        Ok(pages) => pages,
        Err(e) => {
            loader.recycle();
            return Err(e.into());
        }
    };

    println!("{} ({} loader)", args.path.display(), loader.kind());
    for page in &pages {
        let location = match page.stream() {
            Some(PageStream::File(path)) => path.display().to_string(),
            Some(PageStream::Zip { entry, .. })
            | Some(PageStream::Rar { entry, .. }) => entry,
            _ => String::new(),
        };
        if args.read {
            let bytes = page.read().await?;
            println!("{:>4}  {:>9} B  {}", page.number(), bytes.len(), location);
        } else {
            println!("{:>4}  {}", page.number(), location);
        }
    }
    loader.recycle();

    info!(
        "Listed {} pages in {:.2}s",
        pages.len(),
        start_time.elapsed().as_secs_f64()
    );
    if pages.is_empty() {
        println!("No pages found");
    }
    Ok(())
}

/// Handle the cache command
///
/// Rebuilds the download index from disk and prints the number of
/// downloaded chapters per manga folder.
pub async fn handle_cache(args: CacheArgs, config: &AppConfig) -> Result<()> {
    let root = args.root.unwrap_or_else(|| config.downloads.root());
    info!("Scanning download directory {}", root.display());

    let provider = Arc::new(DownloadProvider::new(&root));
    let cache = DownloadCache::new(
        provider,
        Arc::new(InMemorySourceManager::new()),
        config.cache.clone(),
    );
    cache.force_renew_cache().await?;

    let mangas = cache.cached_mangas().await;
    if mangas.is_empty() {
        println!("No downloads under {}", root.display());
        return Ok(());
    }

    let mut total = 0;
    let mut current_source = None;
    for manga in &mangas {
        if current_source != Some(&manga.source_dir) {
            println!("{}", manga.source_dir);
            current_source = Some(&manga.source_dir);
        }
        println!("  {:>5}  {}", manga.chapters, manga.manga_dir);
        total += manga.chapters;
    }
    println!();
    println!(
        "{} chapters in {} mangas under {}",
        total,
        mangas.len(),
        root.display()
    );
    Ok(())
}
