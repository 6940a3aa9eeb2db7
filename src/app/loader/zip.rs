//! Pages from a zip or cbz archive

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::archive::ZipHandle;
use crate::app::image::is_image;
use crate::app::naming::{entry_file_name, natural_cmp};
use crate::app::page::{Page, PageStream};
use crate::constants::archives::SNIFF_LENGTH;
use crate::errors::{LoaderError, LoaderResult};

/// Loader for a chapter stored as a zip archive
///
/// The archive stays open until [`ZipPageLoader::recycle`].
#[derive(Debug, Clone)]
pub struct ZipPageLoader {
    archive: Arc<ZipHandle>,
}

impl ZipPageLoader {
    pub async fn open(path: &Path) -> LoaderResult<Self> {
        let path = path.to_path_buf();
        let handle = tokio::task::spawn_blocking(move || ZipHandle::open(&path, "zip"))
            .await
            .map_err(|e| LoaderError::Io(std::io::Error::other(e)))??;
        Ok(Self {
            archive: Arc::new(handle),
        })
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    /// Image entries as ready pages, in natural order of their full names
    pub async fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        let archive = Arc::clone(&self.archive);
        let entries = tokio::task::spawn_blocking(move || image_entries(&archive))
            .await
            .map_err(|e| LoaderError::Io(std::io::Error::other(e)))??;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                Page::ready(
                    index,
                    PageStream::Zip {
                        archive: Arc::clone(&self.archive),
                        entry,
                    },
                )
            })
            .collect())
    }

    pub fn recycle(&self) {
        debug!("Closing {}", self.archive.path().display());
        self.archive.close();
    }

    pub fn is_recycled(&self) -> bool {
        self.archive.is_closed()
    }
}

fn image_entries(archive: &ZipHandle) -> LoaderResult<Vec<String>> {
    let mut entries = Vec::new();
    for name in archive.file_names()? {
        if entry_file_name(&name).starts_with('.') {
            continue;
        }
        let keep = is_image(&name, None)
            || is_image(&name, Some(&archive.read_entry_head(&name, SNIFF_LENGTH)?));
        if keep {
            entries.push(name);
        }
    }
    entries.sort_by(|a, b| natural_cmp(a, b));
    Ok(entries)
}
