//! Library data models
//!
//! Plain records for mangas and chapters as the library database hands them
//! to the download subsystem. The subsystem never owns these rows; it only
//! reads them and, through [`crate::app::source::ChapterRepository`], looks
//! them up again by id when restoring a persisted queue.

use serde::{Deserialize, Serialize};

/// A manga entry in the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manga {
    /// Database id
    pub id: i64,
    /// Id of the source this manga was added from
    pub source: i64,
    /// Source-relative URL, also the folder name for local mangas
    pub url: String,
    /// Display title, used to name the download directory
    pub title: String,
    /// Whether the manga is in the user's library
    pub favorite: bool,
}

impl Manga {
    /// Create a library manga
    pub fn new(id: i64, source: i64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            source,
            url: url.into(),
            title: title.into(),
            favorite: true,
        }
    }
}

/// A chapter row of a manga
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Database id, unique across mangas
    pub id: i64,
    /// Owning manga id
    pub manga_id: i64,
    /// Source-relative URL
    pub url: String,
    /// Display name, used to name the download directory
    pub name: String,
    /// Scanlation group, prefixed to the download directory when present
    pub scanlator: Option<String>,
    /// Whether the chapter was fully read
    pub read: bool,
    /// Whether the user bookmarked the chapter
    pub bookmark: bool,
    /// Last page the reader displayed
    pub last_page_read: usize,
    /// Parsed chapter number, negative when unknown
    pub chapter_number: f32,
}

impl Chapter {
    /// Create an unread, unbookmarked chapter
    pub fn new(id: i64, manga_id: i64, url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            manga_id,
            url: url.into(),
            name: name.into(),
            scanlator: None,
            read: false,
            bookmark: false,
            last_page_read: 0,
            chapter_number: -1.0,
        }
    }

    /// Set the scanlation group
    pub fn with_scanlator(mut self, scanlator: impl Into<String>) -> Self {
        self.scanlator = Some(scanlator.into());
        self
    }

    /// Scanlator name if it is present and not blank
    pub fn scanlator(&self) -> Option<&str> {
        self.scanlator
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Chapter metadata as reported by a source, before it is stored in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub url: String,
    pub name: String,
    pub scanlator: Option<String>,
    pub chapter_number: f32,
    /// Upload time in milliseconds since the epoch, 0 when unknown
    pub date_upload: i64,
}
