//! Download worker
//!
//! [`Downloader`] drives a single background task over the
//! [`DownloadQueue`](crate::app::queue::DownloadQueue). It owns no queue
//! state of its own; the running flag is the only signal between the task
//! and callers that want it to pause.
//!
//! - [`config`]: retry policy and channel sizes
//! - [`core`]: the worker itself
//! - [`stats`]: retry backoff and per-chapter outcome counts
//! - [`types`]: [`DownloaderEvent`]

pub mod config;
pub mod core;
pub mod stats;
pub mod types;

pub use self::core::Downloader;
pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use stats::{BackoffCalculator, ChapterOutcome};
pub use types::DownloaderEvent;
