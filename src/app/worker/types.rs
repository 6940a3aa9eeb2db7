//! Events published by the downloader

/// Notification from the download worker
///
/// Sent on a broadcast channel; slow receivers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloaderEvent {
    /// The worker loop started
    Started,
    /// The worker paused, the queue is kept
    Paused,
    /// The worker stopped, with a message for the user when there is one
    Stopped { reason: Option<String> },
    /// A chapter was finalised on disk
    ChapterCompleted { chapter_id: i64 },
    /// A chapter ended in error
    ChapterFailed { chapter_id: i64, reason: String },
}

impl DownloaderEvent {
    pub fn chapter_id(&self) -> Option<i64> {
        match self {
            DownloaderEvent::ChapterCompleted { chapter_id }
            | DownloaderEvent::ChapterFailed { chapter_id, .. } => Some(*chapter_id),
            _ => None,
        }
    }
}
