//! In-memory index of downloaded chapters
//!
//! [`DownloadCache`] mirrors `<root>/<source>/<manga>/<chapter>` so that
//! "is this chapter downloaded" can be answered without touching the disk.
//! The index is advisory: callers that need certainty pass `skip_cache` and
//! get a real filesystem check through [`DownloadProvider`].
//!
//! The index is an immutable snapshot behind an `Arc`. Readers clone the
//! `Arc` and query it without holding a lock; writers build a new snapshot
//! and swap it in, so a half-built index is never visible.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::download::provider::DownloadProvider;
use crate::app::models::{Chapter, Manga};
use crate::app::observe::lock;
use crate::app::source::SourceManager;
use crate::constants::{CBZ_EXTENSION, TMP_DIR_SUFFIX};
use crate::errors::{CacheError, CacheResult};

use super::config::CacheConfig;

/// Snapshot of the download directory: source dir -> manga dir -> chapter names
#[derive(Debug, Clone, Default)]
struct CacheIndex {
    sources: HashMap<String, HashMap<String, HashSet<String>>>,
}

impl CacheIndex {
    fn manga(&self, source_dir: &str, manga_dir: &str) -> Option<&HashSet<String>> {
        self.sources.get(source_dir)?.get(manga_dir)
    }

    fn chapter_count(&self) -> usize {
        self.sources
            .values()
            .flat_map(|mangas| mangas.values())
            .map(HashSet::len)
            .sum()
    }
}

/// Summary of one manga directory in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedManga {
    pub source_dir: String,
    pub manga_dir: String,
    pub chapters: usize,
}

/// Advisory index of downloaded chapters
pub struct DownloadCache {
    provider: Arc<DownloadProvider>,
    sources: Arc<dyn SourceManager>,
    config: CacheConfig,
    index: RwLock<Arc<CacheIndex>>,
    last_renew: Mutex<Option<Instant>>,
    renew_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for DownloadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadCache")
            .field("root", &self.provider.root())
            .field("config", &self.config)
            .field("chapters", &self.snapshot().chapter_count())
            .finish()
    }
}

impl DownloadCache {
    /// Create an empty cache; the first read builds the index
    pub fn new(
        provider: Arc<DownloadProvider>,
        sources: Arc<dyn SourceManager>,
        config: CacheConfig,
    ) -> Self {
        Self {
            provider,
            sources,
            config,
            index: RwLock::new(Arc::new(CacheIndex::default())),
            last_renew: Mutex::new(None),
            renew_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether a chapter is downloaded
    ///
    /// With `skip_cache` the answer comes from the filesystem and the index
    /// is neither read nor refreshed.
    pub async fn is_chapter_downloaded(
        &self,
        chapter: &Chapter,
        manga: &Manga,
        skip_cache: bool,
    ) -> bool {
        if skip_cache {
            let source = self.sources.get_or_stub(manga.source);
            return self
                .provider
                .find_chapter_dir(chapter, manga, &source)
                .await
                .is_some();
        }

        self.renew_if_stale().await;
        let (source_dir, manga_dir) = self.keys(manga);
        let index = self.snapshot();
        let Some(chapters) = index.manga(&source_dir, &manga_dir) else {
            return false;
        };
        self.provider
            .get_valid_chapter_dir_names(chapter)
            .iter()
            .any(|name| chapters.contains(name))
    }

    /// Number of downloaded chapters of a manga
    ///
    /// With `skip_cache` the manga directory is listed, ignoring staging
    /// directories.
    pub async fn get_download_count(&self, manga: &Manga, skip_cache: bool) -> usize {
        if skip_cache {
            let source = self.sources.get_or_stub(manga.source);
            let Some(dir) = self.provider.find_manga_dir(manga, &source).await else {
                return 0;
            };
            return match list_chapter_names(&dir).await {
                Ok(names) => names.len(),
                Err(e) => {
                    warn!("Could not list {}: {}", dir.display(), e);
                    0
                }
            };
        }

        self.renew_if_stale().await;
        let (source_dir, manga_dir) = self.keys(manga);
        self.snapshot()
            .manga(&source_dir, &manga_dir)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Record a finished chapter; `.cbz` names are stored without the extension
    pub fn add_chapter(&self, chapter_dir_name: &str, manga: &Manga) {
        let (source_dir, manga_dir) = self.keys(manga);
        let name = strip_archive_extension(chapter_dir_name).to_string();
        self.modify(|index| {
            index
                .sources
                .entry(source_dir)
                .or_default()
                .entry(manga_dir)
                .or_default()
                .insert(name);
        });
    }

    /// Forget chapters under every name they may have been saved as
    pub fn remove_chapters(&self, chapters: &[Chapter], manga: &Manga) {
        let names: Vec<String> = chapters
            .iter()
            .flat_map(|c| self.provider.get_valid_chapter_dir_names(c))
            .collect();
        self.remove_names(&names, manga);
    }

    /// Forget arbitrary entries of a manga directory by file name
    pub fn remove_folders(&self, folders: &[String], manga: &Manga) {
        let names: Vec<String> = folders
            .iter()
            .map(|f| strip_archive_extension(f).to_string())
            .collect();
        self.remove_names(&names, manga);
    }

    /// Forget a whole manga
    pub fn remove_manga(&self, manga: &Manga) {
        let (source_dir, manga_dir) = self.keys(manga);
        self.modify(|index| {
            if let Some(mangas) = index.sources.get_mut(&source_dir) {
                mangas.remove(&manga_dir);
            }
        });
    }

    /// Every manga directory currently in the index
    pub async fn cached_mangas(&self) -> Vec<CachedManga> {
        self.renew_if_stale().await;
        let index = self.snapshot();
        let mut mangas: Vec<CachedManga> = index
            .sources
            .iter()
            .flat_map(|(source_dir, mangas)| {
                mangas.iter().map(move |(manga_dir, chapters)| CachedManga {
                    source_dir: source_dir.clone(),
                    manga_dir: manga_dir.clone(),
                    chapters: chapters.len(),
                })
            })
            .collect();
        mangas.sort_by(|a, b| {
            (a.source_dir.as_str(), a.manga_dir.as_str())
                .cmp(&(b.source_dir.as_str(), b.manga_dir.as_str()))
        });
        mangas
    }

    /// Rebuild the index from disk now, walking the download root once
    pub async fn force_renew_cache(&self) -> CacheResult<()> {
        let _guard = self.renew_lock.lock().await;
        let started = Instant::now();
        let index = build_index(self.provider.root()).await?;
        let chapters = index.chapter_count();

        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(index);
        *lock(&self.last_renew) = Some(Instant::now());

        info!(
            "Rebuilt download cache: {} chapters in {:?}",
            chapters,
            started.elapsed()
        );
        Ok(())
    }

    async fn renew_if_stale(&self) {
        let stale = match *lock(&self.last_renew) {
            Some(at) => at.elapsed() >= self.config.renew_interval,
            None => true,
        };
        if !stale {
            return;
        }
        if let Err(e) = self.force_renew_cache().await {
            warn!("Download cache rebuild failed, keeping previous index: {}", e);
            *lock(&self.last_renew) = Some(Instant::now());
        }
    }

    fn snapshot(&self) -> Arc<CacheIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut CacheIndex),
    {
        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        f(Arc::make_mut(&mut guard));
    }

    fn remove_names(&self, names: &[String], manga: &Manga) {
        let (source_dir, manga_dir) = self.keys(manga);
        self.modify(|index| {
            if let Some(chapters) = index
                .sources
                .get_mut(&source_dir)
                .and_then(|m| m.get_mut(&manga_dir))
            {
                for name in names {
                    chapters.remove(name);
                }
            }
        });
    }

    fn keys(&self, manga: &Manga) -> (String, String) {
        let source = self.sources.get_or_stub(manga.source);
        (
            self.provider.get_source_dir_name(&source),
            self.provider.get_manga_dir_name(manga),
        )
    }
}

fn strip_archive_extension(name: &str) -> &str {
    name.strip_suffix(&format!(".{}", CBZ_EXTENSION))
        .unwrap_or(name)
}

async fn build_index(root: &Path) -> CacheResult<CacheIndex> {
    let mut index = CacheIndex::default();
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        debug!("Download root {} does not exist yet", root.display());
        return Ok(index);
    }

    let mut source_dirs = tokio::fs::read_dir(root)
        .await
        .map_err(|_| CacheError::DirectoryNotAccessible {
            path: root.to_path_buf(),
        })?;
    while let Some(source_entry) = source_dirs.next_entry().await? {
        if !source_entry.file_type().await?.is_dir() {
            continue;
        }
        let source_name = source_entry.file_name().to_string_lossy().into_owned();
        let mangas = index.sources.entry(source_name).or_default();

        let mut manga_dirs = tokio::fs::read_dir(source_entry.path()).await?;
        while let Some(manga_entry) = manga_dirs.next_entry().await? {
            if !manga_entry.file_type().await?.is_dir() {
                continue;
            }
            let manga_name = manga_entry.file_name().to_string_lossy().into_owned();
            let chapters = list_chapter_names(&manga_entry.path()).await?;
            mangas.insert(manga_name, chapters);
        }
    }
    Ok(index)
}

/// Chapter entries of a manga directory, without staging dirs, hidden files or `.cbz`
async fn list_chapter_names(dir: &Path) -> std::io::Result<HashSet<String>> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.ends_with(TMP_DIR_SUFFIX) {
            continue;
        }
        names.insert(strip_archive_extension(&name).to_string());
    }
    Ok(names)
}
