//! Shared handle to an open zip archive
//!
//! Zip-backed loaders (zip, cbz and epub) keep one open `ZipArchive` per
//! chapter. Pages hold an `Arc` to the handle and read entries on demand;
//! closing the handle when the loader is recycled releases the file even
//! though pages may still reference it, and later reads fail with
//! [`LoaderError::Recycled`].
//!
//! All methods block on file I/O and belong on a blocking thread.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zip::ZipArchive;

use crate::app::observe::lock;
use crate::errors::{LoaderError, LoaderResult};

pub struct ZipHandle {
    path: PathBuf,
    format: &'static str,
    archive: Mutex<Option<ZipArchive<File>>>,
}

impl fmt::Debug for ZipHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipHandle")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ZipHandle {
    /// Open `path`; `format` names the container in error messages
    pub fn open(path: &Path, format: &'static str) -> LoaderResult<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(|e| LoaderError::UnreadableArchive {
            format,
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            archive: Mutex::new(Some(archive)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the file entries, in archive order
    pub fn file_names(&self) -> LoaderResult<Vec<String>> {
        let guard = lock(&self.archive);
        let archive = guard.as_ref().ok_or(LoaderError::Recycled)?;
        Ok(archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect())
    }

    pub fn contains(&self, name: &str) -> LoaderResult<bool> {
        let guard = lock(&self.archive);
        let archive = guard.as_ref().ok_or(LoaderError::Recycled)?;
        Ok(archive.index_for_name(name).is_some())
    }

    /// Full content of an entry
    pub fn read_entry(&self, name: &str) -> LoaderResult<Vec<u8>> {
        self.read_with(name, |entry, buf| entry.read_to_end(buf).map(|_| ()))
    }

    /// First `len` bytes of an entry, or fewer for short entries
    pub fn read_entry_head(&self, name: &str, len: usize) -> LoaderResult<Vec<u8>> {
        self.read_with(name, |entry, buf| {
            entry.take(len as u64).read_to_end(buf).map(|_| ())
        })
    }

    fn read_with<F>(&self, name: &str, read: F) -> LoaderResult<Vec<u8>>
    where
        F: FnOnce(&mut dyn Read, &mut Vec<u8>) -> std::io::Result<()>,
    {
        let mut guard = lock(&self.archive);
        let archive = guard.as_mut().ok_or(LoaderError::Recycled)?;
        let mut entry = archive.by_name(name).map_err(|e| LoaderError::UnreadableArchive {
            format: self.format,
            path: self.path.clone(),
            reason: format!("{}: {}", name, e),
        })?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        read(&mut entry, &mut buf)?;
        Ok(buf)
    }

    /// Release the file; later reads fail
    pub fn close(&self) {
        lock(&self.archive).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.archive).is_none()
    }
}

/// Build a zip archive in memory, for tests across the loader modules
#[cfg(test)]
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
