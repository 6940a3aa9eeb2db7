//! Chapter downloads
//!
//! - [`model`]: the [`Download`] job and its status
//! - [`provider`]: on-disk layout of downloaded chapters
//! - [`preferences`]: user settings read by the subsystem
//! - [`store`]: queue persistence
//! - [`pending`]: deferred chapter deletion
//! - [`manager`]: the [`DownloadManager`] facade

pub mod manager;
pub mod model;
pub mod pending;
pub mod preferences;
pub mod provider;
pub mod store;

pub use manager::DownloadManager;
pub use model::{Download, DownloadStatus};
pub use pending::PendingDeleter;
pub use preferences::DownloadPreferences;
pub use provider::DownloadProvider;
pub use store::{DownloadStore, StoredDownload};
