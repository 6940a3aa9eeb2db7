//! Download cache
//!
//! - [`config`]: renew interval
//! - [`index`]: the copy-on-write index of downloaded chapters

pub mod config;
pub mod index;

pub use config::CacheConfig;
pub use index::{CachedManga, DownloadCache};
