//! Pages from a directory of image files

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::app::image::is_image;
use crate::app::naming::natural_cmp;
use crate::app::page::{Page, PageStream};
use crate::constants::archives::SNIFF_LENGTH;
use crate::errors::LoaderResult;

/// Loader for a chapter stored as a plain directory
#[derive(Debug, Clone)]
pub struct DirectoryPageLoader {
    dir: PathBuf,
}

impl DirectoryPageLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Image files of the directory as ready pages, in natural name order
    pub async fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        let files = list_image_files(&self.dir).await?;
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(index, path)| Page::ready(index, PageStream::File(path)))
            .collect())
    }
}

/// Image files directly inside `dir`, sorted by natural file name order
///
/// Files with an unknown extension are kept when their leading bytes look
/// like an image.
pub async fn list_image_files(dir: &Path) -> LoaderResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if is_image(&name, None) || is_image(&name, Some(&read_head(&entry.path()).await?)) {
            files.push((name, entry.path()));
        }
    }
    files.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

async fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LENGTH);
    file.take(SNIFF_LENGTH as u64).read_to_end(&mut head).await?;
    Ok(head)
}
