//! Command-line interface components
//!
//! Argument parsing and command handlers for the `manga-fetcher` binary.

pub mod args;
pub mod commands;

pub use args::{CacheArgs, Cli, Commands, GlobalArgs, PagesArgs};
pub use commands::{handle_cache, handle_pages};
