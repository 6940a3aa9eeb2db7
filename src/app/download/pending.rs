//! Deferred chapter deletion
//!
//! Chapters marked for deletion while they may still be open in a reader
//! are recorded here and deleted later in one go. The set survives restarts
//! in a JSON file keyed by manga id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::app::models::{Chapter, Manga};
use crate::constants::TEMP_FILE_SUFFIX;
use crate::errors::{DownloadError, DownloadResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingEntry {
    manga: Manga,
    chapters: Vec<Chapter>,
}

/// Persisted set of chapters waiting to be deleted
#[derive(Debug)]
pub struct PendingDeleter {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<i64, PendingEntry>>>,
}

impl PendingDeleter {
    /// The file is read lazily on first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record chapters of a manga, merging with what is already pending
    pub async fn add_chapters(&self, chapters: &[Chapter], manga: &Manga) -> DownloadResult<()> {
        if chapters.is_empty() {
            return Ok(());
        }
        let mut guard = self.entries.lock().await;
        let entries = load(&self.path, &mut guard).await?;

        let entry = entries.entry(manga.id).or_insert_with(|| PendingEntry {
            manga: manga.clone(),
            chapters: Vec::new(),
        });
        entry.manga = manga.clone();
        for chapter in chapters {
            if !entry.chapters.iter().any(|c| c.id == chapter.id) {
                entry.chapters.push(chapter.clone());
            }
        }
        debug!("{} chapters of {} pending deletion", entry.chapters.len(), manga.title);

        save(&self.path, entries).await
    }

    /// Take every pending chapter, leaving the set empty
    pub async fn get_pending_chapters(&self) -> DownloadResult<Vec<(Manga, Vec<Chapter>)>> {
        let mut guard = self.entries.lock().await;
        let entries = load(&self.path, &mut guard).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let drained: Vec<(Manga, Vec<Chapter>)> = std::mem::take(entries)
            .into_values()
            .map(|entry| (entry.manga, entry.chapters))
            .collect();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(drained)
    }

    /// Number of chapters waiting
    pub async fn pending_count(&self) -> DownloadResult<usize> {
        let mut guard = self.entries.lock().await;
        let entries = load(&self.path, &mut guard).await?;
        Ok(entries.values().map(|e| e.chapters.len()).sum())
    }
}

async fn load<'a>(
    path: &Path,
    slot: &'a mut Option<BTreeMap<i64, PendingEntry>>,
) -> DownloadResult<&'a mut BTreeMap<i64, PendingEntry>> {
    if slot.is_none() {
        let entries = match tokio::fs::read(path).await {
            Ok(content) => serde_json::from_slice(&content).map_err(|e| DownloadError::Persistence {
                what: "pending deletions",
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        *slot = Some(entries);
    }
    Ok(slot.get_or_insert_with(BTreeMap::new))
}

async fn save(path: &Path, entries: &BTreeMap<i64, PendingEntry>) -> DownloadResult<()> {
    let json = serde_json::to_vec_pretty(entries).map_err(|e| DownloadError::Persistence {
        what: "pending deletions",
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = PathBuf::from(format!("{}{}", path.display(), TEMP_FILE_SUFFIX));
    tokio::fs::write(&temp_path, json).await?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|_| DownloadError::AtomicOperationFailed {
            temp_path,
            final_path: path.to_path_buf(),
        })
}
