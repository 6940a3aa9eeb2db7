//! Pages from an epub book
//!
//! The container file points at the package document; the package's spine
//! lists the content documents in reading order, and every image those
//! documents reference becomes a page.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::debug;

use super::archive::ZipHandle;
use crate::app::page::{Page, PageStream};
use crate::constants::archives::{
    EPUB_CONTAINER, EPUB_IMAGE_SELECTOR, EPUB_MANIFEST_SELECTOR, EPUB_ROOTFILE_SELECTOR,
    EPUB_SPINE_SELECTOR,
};
use crate::errors::{LoaderError, LoaderResult};

/// Loader for a chapter stored as an epub
#[derive(Debug, Clone)]
pub struct EpubPageLoader {
    archive: Arc<ZipHandle>,
}

impl EpubPageLoader {
    pub async fn open(path: &Path) -> LoaderResult<Self> {
        let path = path.to_path_buf();
        let handle = tokio::task::spawn_blocking(move || ZipHandle::open(&path, "epub"))
            .await
            .map_err(|e| LoaderError::Io(std::io::Error::other(e)))??;
        Ok(Self {
            archive: Arc::new(handle),
        })
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    pub async fn get_pages(&self) -> LoaderResult<Vec<Page>> {
        let archive = Arc::clone(&self.archive);
        let images = tokio::task::spawn_blocking(move || spine_images(&archive))
            .await
            .map_err(|e| LoaderError::Io(std::io::Error::other(e)))??;

        debug!(
            "Epub {} has {} images",
            self.archive.path().display(),
            images.len()
        );
        Ok(images
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
        self.archive.close();
    }

    pub fn is_recycled(&self) -> bool {
        self.archive.is_closed()
    }
}

/// Image entries referenced by the spine documents, in reading order
fn spine_images(archive: &ZipHandle) -> LoaderResult<Vec<String>> {
    let package_path = package_path(archive)?;
    let package = parse_entry(archive, &package_path)?;

    let manifest_selector = selector(archive, EPUB_MANIFEST_SELECTOR)?;
    let manifest: HashMap<&str, &str> = package
        .select(&manifest_selector)
        .filter_map(|item| Some((item.value().attr("id")?, item.value().attr("href")?)))
        .collect();

    let spine_selector = selector(archive, EPUB_SPINE_SELECTOR)?;
    let documents: Vec<String> = package
        .select(&spine_selector)
        .filter_map(|itemref| itemref.value().attr("idref"))
        .filter_map(|idref| manifest.get(idref))
        .map(|href| resolve_entry(&package_path, href))
        .collect();

    let image_selector = selector(archive, EPUB_IMAGE_SELECTOR)?;
    let mut images = Vec::new();
    for document_path in documents {
        let document = parse_entry(archive, &document_path)?;
        for element in document.select(&image_selector) {
            let reference = element
                .value()
                .attrs()
                .find(|(name, _)| *name == "src" || *name == "href")
                .map(|(_, value)| value);
            let Some(reference) = reference else {
                continue;
            };
            let entry = resolve_entry(&document_path, reference);
            if !archive.contains(&entry)? {
                return Err(LoaderError::MissingEpubEntry { entry });
            }
            images.push(entry);
        }
    }
    Ok(images)
}

/// Location of the package document named by the container file
fn package_path(archive: &ZipHandle) -> LoaderResult<String> {
    let container = parse_entry(archive, EPUB_CONTAINER)?;
    let rootfile = selector(archive, EPUB_ROOTFILE_SELECTOR)?;
    container
        .select(&rootfile)
        .find_map(|element| element.value().attr("full-path"))
        .map(str::to_string)
        .ok_or_else(|| LoaderError::MissingEpubEntry {
            entry: format!("{} rootfile", EPUB_CONTAINER),
        })
}

fn parse_entry(archive: &ZipHandle, entry: &str) -> LoaderResult<Html> {
    if !archive.contains(entry)? {
        return Err(LoaderError::MissingEpubEntry {
            entry: entry.to_string(),
        });
    }
    let bytes = archive.read_entry(entry)?;
    Ok(Html::parse_document(&String::from_utf8_lossy(&bytes)))
}

fn selector(archive: &ZipHandle, css: &str) -> LoaderResult<Selector> {
    Selector::parse(css).map_err(|e| LoaderError::UnreadableArchive {
        format: "epub",
        path: archive.path().to_path_buf(),
        reason: format!("bad selector {}: {}", css, e),
    })
}

/// Resolve `reference` against the entry that contains it
///
/// Fragments and queries are dropped and percent escapes decoded; a leading
/// slash means the archive root.
fn resolve_entry(base_entry: &str, reference: &str) -> String {
    let reference = reference
        .split(['#', '?'])
        .next()
        .unwrap_or(reference);
    let reference = urlencoding::decode(reference)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| reference.to_string());

    let mut parts: Vec<&str> = Vec::new();
    if !reference.starts_with('/') {
        if let Some((dir, _)) = base_entry.rsplit_once('/') {
            parts.extend(dir.split('/'));
        }
    }
    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
