//! Local library source
//!
//! Mangas live as directories under a root folder and chapters as
//! sub-directories or archives inside them:
//! `<root>/<manga url>/<chapter file>`. A chapter's `url` is the path of
//! its file relative to the root.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::app::models::{Chapter, ChapterInfo, Manga};
use crate::app::naming::natural_cmp;
use crate::errors::{LoaderError, LoaderResult, SourceResult};

/// Source id reserved for the local library
pub const LOCAL_SOURCE_ID: i64 = 0;

/// Container format of a local chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalFormat {
    Directory(PathBuf),
    /// `.zip` or `.cbz`
    Zip(PathBuf),
    /// `.rar` or `.cbr`
    Rar(PathBuf),
    Epub(PathBuf),
}

impl LocalFormat {
    /// Detect the format of a chapter file or directory
    ///
    /// # Errors
    ///
    /// `LoaderError::UnknownFormat` for missing paths and unsupported files.
    pub async fn detect(path: &Path) -> LoaderResult<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| LoaderError::UnknownFormat {
                path: path.to_path_buf(),
            })?;

        if metadata.is_dir() {
            return Ok(LocalFormat::Directory(path.to_path_buf()));
        }

        Self::from_extension(path).ok_or_else(|| LoaderError::UnknownFormat {
            path: path.to_path_buf(),
        })
    }

    fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let path = path.to_path_buf();
        match ext.as_str() {
            "zip" | "cbz" => Some(LocalFormat::Zip(path)),
            "rar" | "cbr" => Some(LocalFormat::Rar(path)),
            "epub" => Some(LocalFormat::Epub(path)),
            _ => None,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            LocalFormat::Directory(p)
            | LocalFormat::Zip(p)
            | LocalFormat::Rar(p)
            | LocalFormat::Epub(p) => p,
        }
    }
}

/// Source backed by a directory tree on this machine
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn id(&self) -> i64 {
        LOCAL_SOURCE_ID
    }

    pub fn name(&self) -> &str {
        "Local source"
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List the chapters of a local manga, newest name first
    pub async fn get_chapter_list(&self, manga: &Manga) -> SourceResult<Vec<ChapterInfo>> {
        let manga_dir = self.root.join(&manga.url);
        let mut entries = tokio::fs::read_dir(&manga_dir).await?;
        let mut chapters = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let is_dir = entry.file_type().await?.is_dir();
            if !is_dir && LocalFormat::from_extension(&path).is_none() {
                continue;
            }

            let display = if is_dir {
                name.clone()
            } else {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone())
            };

            chapters.push(ChapterInfo {
                url: format!("{}/{}", manga.url, name),
                chapter_number: parse_chapter_number(&display),
                name: display,
                scanlator: None,
                date_upload: 0,
            });
        }

        chapters.sort_by(|a, b| natural_cmp(&b.name, &a.name));
        debug!(
            "Found {} local chapters in {}",
            chapters.len(),
            manga_dir.display()
        );
        Ok(chapters)
    }

    /// Resolve the on-disk format of a chapter
    pub async fn get_format(&self, chapter: &Chapter) -> LoaderResult<LocalFormat> {
        LocalFormat::detect(&self.root.join(&chapter.url)).await
    }
}

/// First number in a chapter name, or -1
fn parse_chapter_number(name: &str) -> f32 {
    let start = match name.find(|c: char| c.is_ascii_digit()) {
        Some(i) => i,
        None => return -1.0,
    };
    let number: String = name[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.trim_end_matches('.').parse().unwrap_or(-1.0)
}
