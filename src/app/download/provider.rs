//! On-disk layout of downloaded chapters
//!
//! Downloads live under `<root>/<source>/<manga>/<chapter>`, where each
//! component is a sanitised display name and a chapter is either a
//! directory of page images or a `<chapter>.cbz` archive. While a chapter is
//! being downloaded its pages are staged in `<chapter>_tmp`.
//!
//! Everything here is a pure derivation or a read of the filesystem except
//! [`DownloadProvider::get_manga_dir`], which creates the directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::app::models::{Chapter, Manga};
use crate::app::naming::sanitize_filename;
use crate::app::source::Source;
use crate::constants::{CBZ_EXTENSION, TMP_DIR_SUFFIX};
use crate::errors::{DownloadError, DownloadResult};

/// Resolves directories for sources, mangas and chapters
#[derive(Debug, Clone)]
pub struct DownloadProvider {
    root: PathBuf,
}

impl DownloadProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get_source_dir_name(&self, source: &Source) -> String {
        sanitize_filename(&source.display_name())
    }

    pub fn get_manga_dir_name(&self, manga: &Manga) -> String {
        sanitize_filename(&manga.title)
    }

    /// Current directory name of a chapter, `<scanlator>_<name>` when a scanlator is set
    pub fn get_chapter_dir_name(&self, chapter: &Chapter) -> String {
        match chapter.scanlator() {
            Some(scanlator) => sanitize_filename(&format!("{}_{}", scanlator, chapter.name)),
            None => sanitize_filename(&chapter.name),
        }
    }

    /// Every directory name a chapter may have been saved under, current name first
    pub fn get_valid_chapter_dir_names(&self, chapter: &Chapter) -> Vec<String> {
        let current = self.get_chapter_dir_name(chapter);
        let legacy = sanitize_filename(&chapter.name);
        if legacy == current {
            vec![current]
        } else {
            vec![current, legacy]
        }
    }

    /// Valid names plus their `.cbz` variants
    pub fn get_valid_chapter_file_names(&self, chapter: &Chapter) -> Vec<String> {
        self.get_valid_chapter_dir_names(chapter)
            .into_iter()
            .flat_map(|name| {
                let archive = format!("{}.{}", name, CBZ_EXTENSION);
                [name, archive]
            })
            .collect()
    }

    /// Staging directory name for a chapter directory name
    pub fn temp_dir_name(name: &str) -> String {
        format!("{}{}", name, TMP_DIR_SUFFIX)
    }

    pub fn source_dir_path(&self, source: &Source) -> PathBuf {
        self.root.join(self.get_source_dir_name(source))
    }

    pub fn manga_dir_path(&self, manga: &Manga, source: &Source) -> PathBuf {
        self.source_dir_path(source)
            .join(self.get_manga_dir_name(manga))
    }

    /// Directory of a manga, created if missing
    pub async fn get_manga_dir(&self, manga: &Manga, source: &Source) -> DownloadResult<PathBuf> {
        let dir = self.manga_dir_path(manga, source);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            debug!("Failed to create manga directory {}: {}", dir.display(), e);
            DownloadError::Io(e)
        })?;
        Ok(dir)
    }

    pub async fn find_source_dir(&self, source: &Source) -> Option<PathBuf> {
        existing_dir(self.source_dir_path(source)).await
    }

    pub async fn find_manga_dir(&self, manga: &Manga, source: &Source) -> Option<PathBuf> {
        existing_dir(self.manga_dir_path(manga, source)).await
    }

    /// Downloaded directory or archive of a chapter, if any
    pub async fn find_chapter_dir(
        &self,
        chapter: &Chapter,
        manga: &Manga,
        source: &Source,
    ) -> Option<PathBuf> {
        let manga_dir = self.find_manga_dir(manga, source).await?;
        for name in self.get_valid_chapter_file_names(chapter) {
            let candidate = manga_dir.join(&name);
            if exists(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Downloaded directories or archives of several chapters
    pub async fn find_chapter_dirs(
        &self,
        chapters: &[Chapter],
        manga: &Manga,
        source: &Source,
    ) -> Vec<PathBuf> {
        let Some(manga_dir) = self.find_manga_dir(manga, source).await else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for chapter in chapters {
            for name in self.get_valid_chapter_file_names(chapter) {
                let candidate = manga_dir.join(&name);
                if exists(&candidate).await {
                    found.push(candidate);
                }
            }
        }
        found
    }

    /// Staging directories left behind by unfinished downloads of these chapters
    pub async fn find_temp_chapter_dirs(
        &self,
        chapters: &[Chapter],
        manga: &Manga,
        source: &Source,
    ) -> Vec<PathBuf> {
        let Some(manga_dir) = self.find_manga_dir(manga, source).await else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for chapter in chapters {
            for name in self.get_valid_chapter_dir_names(chapter) {
                let candidate = manga_dir.join(Self::temp_dir_name(&name));
                if exists(&candidate).await {
                    found.push(candidate);
                }
            }
        }
        found
    }

    /// Entries of the manga directory that belong to none of `all_chapters`
    ///
    /// Staging directories count as unmatched.
    pub async fn find_unmatched_chapter_dirs(
        &self,
        all_chapters: &[Chapter],
        manga: &Manga,
        source: &Source,
    ) -> Vec<PathBuf> {
        let Some(manga_dir) = self.find_manga_dir(manga, source).await else {
            return Vec::new();
        };
        let known: std::collections::HashSet<String> = all_chapters
            .iter()
            .flat_map(|c| self.get_valid_chapter_file_names(c))
            .collect();

        let mut unmatched = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&manga_dir).await else {
            return unmatched;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_DIR_SUFFIX) || !known.contains(&name) {
                unmatched.push(entry.path());
            }
        }
        unmatched
    }

    /// Directories under the source directory, one per downloaded manga
    pub async fn get_manga_folders(&self, source: &Source) -> Vec<PathBuf> {
        let Some(source_dir) = self.find_source_dir(source).await else {
            return Vec::new();
        };
        let mut folders = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&source_dir).await else {
            return folders;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if matches!(entry.file_type().await, Ok(t) if t.is_dir()) {
                folders.push(entry.path());
            }
        }
        folders.sort();
        folders
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn existing_dir(path: PathBuf) -> Option<PathBuf> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => Some(path),
        _ => None,
    }
}
