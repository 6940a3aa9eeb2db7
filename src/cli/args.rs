//! Command-line argument parsing for Manga Fetcher
//!
//! The CLI is a thin inspection tool over the library: it opens local
//! chapters through the page loaders and reports what the download cache
//! sees on disk.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Manga Fetcher - inspect chapters and downloads
#[derive(Parser, Debug)]
#[command(
    name = "manga-fetcher",
    version,
    about = "Inspect manga chapters and the download directory",
    long_about = "Opens local chapters (directories, zip/cbz, rar/cbr and epub) with the same page loaders the reader uses,
and rebuilds the download cache to report which chapters are on disk."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - only errors are logged
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the pages of a local chapter in reading order
    Pages(PagesArgs),

    /// Rebuild the download cache and summarise it
    Cache(CacheArgs),
}

/// Arguments for the pages command
#[derive(Args, Debug, Clone)]
pub struct PagesArgs {
    /// Chapter directory or archive (.zip, .cbz, .rar, .cbr, .epub)
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Read every page and print its size
    #[arg(long)]
    pub read: bool,
}

/// Arguments for the cache command
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Download root to scan instead of the configured one
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level from the verbosity flags, `None` to use the configured level
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}
