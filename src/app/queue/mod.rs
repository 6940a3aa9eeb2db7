//! Download queue
//!
//! An ordered, observable list of [`Download`](crate::app::download::Download)
//! jobs. Every structural change swaps in a new list and then notifies the
//! registered [`DownloadListener`]s; status changes of queued downloads are
//! forwarded to the same listeners.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use manga_fetcher::app::queue::{DownloadListener, DownloadQueue};
//!
//! struct Printer;
//!
//! impl DownloadListener for Printer {
//!     fn update_downloads(&self) {
//!         println!("queue changed");
//!     }
//! }
//!
//! let queue = DownloadQueue::new();
//! let id = queue.add_listener(Arc::new(Printer));
//! queue.update_listeners();
//! queue.remove_listener(id);
//! ```

pub mod core;
pub mod types;

pub use self::core::DownloadQueue;
pub use types::{DownloadListener, ListenerId};
