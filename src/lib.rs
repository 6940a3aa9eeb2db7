//! Manga Fetcher Library
//!
//! Download queue, on-disk chapter cache and page loaders for a manga
//! library client. Chapters are downloaded page by page into
//! `<root>/<source>/<manga>/<chapter>` (optionally archived as `.cbz`) and
//! read back, from disk, from a remote source or from a local library,
//! through a uniform page interface.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
