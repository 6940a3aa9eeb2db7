//! Application constants for Manga Fetcher
//!
//! This module centralizes the constants used throughout the crate,
//! organized by functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Manga-Fetcher/0.1.0";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for source requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum retry attempts for failed requests
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;
}

/// On-disk layout of the download directory
pub mod files {
    /// Suffix of a chapter directory while it is being downloaded
    pub const TMP_DIR_SUFFIX: &str = "_tmp";

    /// Suffix of a page file while its bytes are being written
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Extension of a chapter saved as a single archive
    pub const CBZ_EXTENSION: &str = "cbz";

    /// Name used when sanitising leaves nothing behind
    pub const INVALID_FILENAME: &str = "(invalid)";

    /// Longest file name written to disk (ext4 limit minus reserved room)
    pub const MAX_FILENAME_LENGTH: usize = 240;

    /// Persisted download queue
    pub const QUEUE_FILE_NAME: &str = ".download_queue.json";

    /// Persisted chapters awaiting deletion
    pub const PENDING_DELETE_FILE_NAME: &str = ".pending_delete.json";
}

/// Download worker configuration
pub mod workers {
    use super::Duration;

    /// Pages fetched concurrently within one chapter
    pub const DEFAULT_PAGE_CONCURRENCY: usize = 4;

    /// Upper bound for page concurrency
    pub const MAX_PAGE_CONCURRENCY: usize = 16;

    /// Maximum retry attempts per page
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay between page retries
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Cap for page retry delay
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Exponential backoff multiplier for page retries
    pub const RETRY_BACKOFF_MULTIPLIER: u32 = 2;

    /// Buffer size of the downloader event channel
    pub const EVENT_BUFFER_SIZE: usize = 64;
}

/// Download cache constants
pub mod cache {
    use super::Duration;

    /// Index is rebuilt from disk when older than this
    pub const RENEW_INTERVAL: Duration = Duration::from_secs(60 * 60);
}

/// Config file locations
pub mod config {
    /// Application directory name under the user config directory
    pub const APP_DIR_NAME: &str = "manga-fetcher";

    /// Project-local config file name
    pub const LOCAL_CONFIG_FILE: &str = "manga-fetcher.toml";

    /// Config file name inside the application directory
    pub const CONFIG_FILE: &str = "config.toml";

    /// Default download directory name
    pub const DOWNLOADS_DIR: &str = "downloads";
}

/// Archive and epub layout constants
pub mod archives {
    /// Bytes read from an entry to sniff its image type
    pub const SNIFF_LENGTH: usize = 32;

    /// Leading bytes of a RAR 5.x archive
    pub const RAR5_SIGNATURE: &[u8] = b"Rar!\x1a\x07\x01\x00";

    /// Epub entry naming the package document
    pub const EPUB_CONTAINER: &str = "META-INF/container.xml";

    /// Selector for the package document reference in the container
    pub const EPUB_ROOTFILE_SELECTOR: &str = "rootfile";

    /// Selector for package manifest items
    pub const EPUB_MANIFEST_SELECTOR: &str = "manifest item";

    /// Selector for reading order references
    pub const EPUB_SPINE_SELECTOR: &str = "spine itemref";

    /// Selector for images in a content document
    pub const EPUB_IMAGE_SELECTOR: &str = "img, image";
}

// Re-export commonly used constants for convenience
pub use files::{CBZ_EXTENSION, TEMP_FILE_SUFFIX, TMP_DIR_SUFFIX};
pub use http::USER_AGENT;
pub use limits::DEFAULT_RATE_LIMIT_RPS;
