//! Pages from a rar or cbr archive
//!
//! Reading rar needs the `rar` cargo feature. Without it every rar chapter
//! fails to open; RAR 5.x archives are reported as an unsupported version
//! either way when the backend cannot list them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::app::image::is_image;
use crate::app::naming::{entry_file_name, natural_cmp};
use crate::app::page::{Page, PageStream};
use crate::constants::archives::RAR5_SIGNATURE;
use crate::errors::{LoaderError, LoaderResult};

/// Loader for a chapter stored as a rar archive
///
/// Entries are extracted by reopening the archive on each read, so there is
/// no handle to release; recycling stops further reads through the loader
/// and through every page it handed out.
#[derive(Debug)]
pub struct RarPageLoader {
    path: PathBuf,
    entries: Vec<String>,
    recycled: Arc<AtomicBool>,
}

impl RarPageLoader {
    pub async fn open(path: &Path) -> LoaderResult<Self> {
        let listed = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || backend::list_entries(&path))
                .await
                .map_err(|e| LoaderError::Io(std::io::Error::other(e)))?
        };

        let names = match listed {
            Ok(names) => names,
            Err(reason) => {
                if is_rar5(path).await {
                    return Err(LoaderError::UnsupportedRarVersion {
                        path: path.to_path_buf(),
                    });
                }
                return Err(LoaderError::UnreadableArchive {
                    format: "rar",
                    path: path.to_path_buf(),
                    reason,
                });
            }
        };

        let mut entries: Vec<String> = names
            .into_iter()
            .filter(|name| !entry_file_name(name).starts_with('.') && is_image(name, None))
            .collect();
        entries.sort_by(|a, b| natural_cmp(a, b));

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            recycled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        if self.is_recycled() {
            return Err(LoaderError::Recycled);
        }
        Ok(self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                Page::ready(
                    index,
                    PageStream::Rar {
                        path: self.path.clone(),
                        entry: entry.clone(),
                        recycled: Arc::clone(&self.recycled),
                    },
                )
            })
            .collect())
    }

    pub fn recycle(&self) {
        debug!("Recycling rar loader for {}", self.path.display());
        self.recycled.store(true, Ordering::SeqCst);
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::SeqCst)
    }
}

/// Extract one entry of a rar archive
pub async fn read_entry(path: &Path, entry: &str) -> LoaderResult<Bytes> {
    let owned_path = path.to_path_buf();
    let owned_entry = entry.to_string();
    tokio::task::spawn_blocking(move || backend::extract(&owned_path, &owned_entry))
        .await
        .map_err(|e| LoaderError::Io(std::io::Error::other(e)))?
        .map(Bytes::from)
        .map_err(|reason| LoaderError::UnreadableArchive {
            format: "rar",
            path: path.to_path_buf(),
            reason,
        })
}

/// Whether the file starts with the RAR 5.x signature
pub async fn is_rar5(path: &Path) -> bool {
    let Ok(file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut head = Vec::with_capacity(RAR5_SIGNATURE.len());
    match file
        .take(RAR5_SIGNATURE.len() as u64)
        .read_to_end(&mut head)
        .await
    {
        Ok(_) => head == RAR5_SIGNATURE,
        Err(_) => false,
    }
}

#[cfg(feature = "rar")]
mod backend {
    use std::path::Path;

    pub(super) fn list_entries(path: &Path) -> Result<Vec<String>, String> {
        let archive = unrar::Archive::new(path)
            .open_for_listing()
            .map_err(|e| e.to_string())?;
        let mut names = Vec::new();
        for header in archive {
            let header = header.map_err(|e| e.to_string())?;
            if header.is_file() {
                names.push(header.filename.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(names)
    }

    pub(super) fn extract(path: &Path, entry: &str) -> Result<Vec<u8>, String> {
        let mut archive = unrar::Archive::new(path)
            .open_for_processing()
            .map_err(|e| e.to_string())?;
        while let Some(header) = archive.read_header().map_err(|e| e.to_string())? {
            let name = header.entry().filename.to_string_lossy().replace('\\', "/");
            if name == entry {
                let (data, _) = header.read().map_err(|e| e.to_string())?;
                return Ok(data);
            }
            archive = header.skip().map_err(|e| e.to_string())?;
        }
        Err(format!("no entry named {}", entry))
    }
}

#[cfg(not(feature = "rar"))]
mod backend {
    use std::path::Path;

    const UNSUPPORTED: &str = "built without rar support";

    pub(super) fn list_entries(_path: &Path) -> Result<Vec<String>, String> {
        Err(UNSUPPORTED.to_string())
    }

    pub(super) fn extract(_path: &Path, _entry: &str) -> Result<Vec<u8>, String> {
        Err(UNSUPPORTED.to_string())
    }
}
