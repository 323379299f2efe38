//! mediawatch CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mediawatch::{
    browser,
    error::Result,
    models::{Config, Platform},
    pipeline,
    storage::CsvStore,
};

/// mediawatch - keyword mention crawler
#[derive(Parser, Debug)]
#[command(
    name = "mediawatch",
    version,
    about = "Keyword mention crawler for Chinese social platforms"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the enabled platforms and append new rows
    Crawl {
        /// Crawl a single platform (weibo, zhihu or xiaohongshu)
        #[arg(long)]
        platform: Option<String>,
    },

    /// Capture a browser login session for zhihu
    Login,

    /// Validate the configuration file
    Validate,

    /// Show table sizes and session state
    Info,
}

/// Set up env_logger; `-v` lowers the default filter to debug.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("mediawatch starting...");

    let config = Config::load_or_default(&cli.config);
    let config = Arc::new(config);
    let store = CsvStore::new(&config.paths.data_dir);

    match cli.command {
        Command::Crawl { platform } => {
            config.validate()?;

            let only = platform.map(|p| p.parse::<Platform>()).transpose()?;
            if let Some(platform) = only {
                log::info!("Crawling {platform} only");
            }

            let outcomes = pipeline::run_crawl(Arc::clone(&config), &store, only).await?;

            let appended: usize = outcomes.iter().map(|o| o.appended).sum();
            for outcome in &outcomes {
                log::info!(
                    "{}: {} found, {} appended, {} duplicates",
                    outcome.platform,
                    outcome.found,
                    outcome.appended,
                    outcome.duplicates
                );
            }
            log::info!("Crawl complete: {appended} new rows total");
        }

        Command::Login => {
            browser::capture_login(&config).await?;
            log::info!("Session state saved to {}", config.paths.state_file);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} keywords)", config.clean_keywords().len());

            if config.weibo.cookie.trim().is_empty() {
                log::warn!("weibo.cookie is empty; weibo searches will run logged-out");
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Data directory: {}", config.paths.data_dir);

            for platform in Platform::ALL {
                match store.row_count(platform)? {
                    Some(count) => log::info!("{platform}: {count} rows stored"),
                    None => log::info!("{platform}: no table yet"),
                }
            }

            let state = PathBuf::from(&config.paths.state_file);
            log::info!(
                "Session state: {}",
                if state.exists() { "exists" } else { "not found" }
            );
        }
    }

    log::info!("Done!");

    Ok(())
}
