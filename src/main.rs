//! Manga Fetcher CLI application
//!
//! Inspects local chapters and the download directory using the library's
//! page loaders and download cache.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use manga_fetcher::cli::{handle_cache, handle_pages, Cli, Commands};
use manga_fetcher::config::AppConfig;
use manga_fetcher::errors::{AppError, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config)?;
    info!("Manga Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Pages(args) => {
            info!("Executing pages command");
            handle_pages(args).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, &config).await
        }
    }
}

/// Initialize logging from the CLI verbosity flags, falling back to the
/// configured level
fn init_logging(cli: &Cli, config: &AppConfig) -> Result<()> {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.clone());

    let directive = format!("manga_fetcher={}", level)
        .parse()
        .map_err(|e| AppError::generic(format!("Invalid log level {}: {}", level, e)))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
    Ok(())
}
