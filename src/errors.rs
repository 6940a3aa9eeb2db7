//! Error types for Manga Fetcher
//!
//! Each subsystem owns an error enum; [`AppError`] aggregates them for callers
//! that drive several subsystems at once (the CLI, the download manager).
//! Errors carry enough context to be shown to a user verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a catalog backend (remote or local)
#[derive(Error, Debug)]
pub enum SourceError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Maximum retries exceeded
    #[error("Maximum retry attempts ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    /// Invalid URL provided by the source
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// The source returned no pages for a chapter
    #[error("Page list is empty")]
    EmptyPageList,

    /// The page has no image URL and the source could not resolve one
    #[error("No image URL for page {index}")]
    MissingImageUrl { index: usize },

    /// The source of a manga is not available
    #[error("Source not installed: {id}")]
    NotInstalled { id: i64 },

    /// I/O error in a local source
    #[error("Source I/O error")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure
    #[error("{0}")]
    Other(String),
}

/// Download worker and queue errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Failure reported by the chapter's source
    #[error(transparent)]
    Source(#[from] SourceError),

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Writing the chapter archive failed
    #[error("Could not write archive {path}: {reason}")]
    ArchiveWrite { path: PathBuf, reason: String },

    /// Not every page of the chapter reached the ready state
    #[error("Incomplete chapter: {downloaded} of {total} pages downloaded")]
    IncompleteChapter { downloaded: usize, total: usize },

    /// Queue or pending-deletion file could not be read or written
    #[error("Could not persist {what}: {reason}")]
    Persistence { what: &'static str, reason: String },

    /// Worker configuration rejected
    #[error("Invalid worker configuration: {0}")]
    ConfigurationError(String),
}

/// Download cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Download root not found or inaccessible
    #[error("Download directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// I/O error while walking the download root
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),
}

/// Errors raised while resolving a chapter into pages
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Loading succeeded but produced nothing to read
    #[error("No pages found")]
    NoPagesFound,

    /// Zip, rar or epub container could not be read
    #[error("Unreadable {format} archive {path}: {reason}")]
    UnreadableArchive {
        format: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// RAR5 archives are not supported
    #[error("RAR5 archives are not supported: {path}")]
    UnsupportedRarVersion { path: PathBuf },

    /// An epub references an entry that is not in the archive
    #[error("Missing epub entry: {entry}")]
    MissingEpubEntry { entry: String },

    /// The local chapter is not a directory or a known archive type
    #[error("Unknown chapter format: {path}")]
    UnknownFormat { path: PathBuf },

    /// The chapter's source is neither downloaded, remote nor local
    #[error("Source not installed: {id}")]
    SourceNotInstalled { id: i64 },

    /// The loader was recycled while an operation was in flight
    #[error("Page loader has been recycled")]
    Recycled,

    /// A page was read before its bytes were available
    #[error("Page {index} has no stream")]
    StreamUnavailable { index: usize },

    /// Remote source failure
    #[error(transparent)]
    Source(#[from] SourceError),

    /// I/O error reading a local chapter
    #[error("Loader I/O error")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading the configuration
    #[error("Could not read configuration")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Source error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Loader error
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Source(e) | AppError::Download(DownloadError::Source(e)) => {
                e.is_transient()
            }
            AppError::Download(DownloadError::IncompleteChapter { .. }) => true,
            AppError::Loader(LoaderError::Source(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Source(_) => "source",
            AppError::Download(_) => "download",
            AppError::Cache(_) => "cache",
            AppError::Loader(_) => "loader",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

impl SourceError {
    /// Whether retrying the same request may succeed
    ///
    /// `MaxRetriesExceeded` is final: its retries have already been spent.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(_) | SourceError::RateLimitExceeded => true,
            SourceError::ServerError { status } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Source result type alias
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Loader result type alias
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
