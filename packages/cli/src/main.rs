#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the catalog harvester.
//!
//! Searches the catalog for every given term, enriches what it finds and
//! writes the records to a timestamped CSV snapshot. Ctrl-C stops the run
//! early; whatever was enriched by then is still written.

mod keywords;
mod snapshot;

use std::path::PathBuf;
use std::time::Instant;

use catalog_harvest::{ConfigError, HarvestConfig, Harvester};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// Environment variable holding the API access token.
const TOKEN_ENV: &str = "HARVEST_ACCESS_TOKEN";

#[derive(Parser)]
#[command(
    name = "catalog_harvest",
    about = "Harvest catalog search results into a CSV snapshot"
)]
struct Cli {
    /// Search terms (combined with any read from `--keywords`)
    terms: Vec<String>,
    /// File with one search term per line (`#` starts a comment)
    #[arg(long)]
    keywords: Option<PathBuf>,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Access token (defaults to `HARVEST_ACCESS_TOKEN`)
    #[arg(long)]
    token: Option<String>,
    /// Maximum identifiers carried into the detail fetch
    #[arg(long)]
    max_identifiers: Option<usize>,
    /// Concurrent requests during fetch and enrichment
    #[arg(long)]
    concurrency: Option<usize>,
    /// Maximum search pages per term
    #[arg(long)]
    max_pages: Option<u32>,
    /// Query the review metrics provider
    #[arg(long)]
    fetch_reviews: bool,
    /// Query the sales metrics provider
    #[arg(long)]
    fetch_sales: bool,
    /// Snapshot file prefix; `_<unix-seconds>.csv` is appended
    #[arg(long, default_value = "catalog_snapshot")]
    output_prefix: String,
}

impl Cli {
    /// Defaults, then the TOML file, then `HARVEST_*` variables, then flags.
    fn harvest_config(&self) -> Result<HarvestConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => HarvestConfig::load(path)?,
            None => HarvestConfig::default(),
        };
        let mut config = base.with_env_overrides()?;

        if let Some(n) = self.max_identifiers {
            config.max_identifiers = n;
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.max_pages {
            config.max_pages = n;
        }
        config.fetch_reviews |= self.fetch_reviews;
        config.fetch_sales |= self.fetch_sales;

        Ok(config)
    }

    fn terms(&self) -> std::io::Result<Vec<String>> {
        let mut terms = self.terms.clone();
        if let Some(path) = &self.keywords {
            terms.extend(keywords::load_terms(path)?);
        }
        Ok(terms)
    }

    fn access_token(&self) -> String {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .or_else(|| catalog_harvest_cli_utils::prompt_secret("Access token"))
            .unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = catalog_harvest_cli_utils::init_logger();
    let cli = Cli::parse();

    let terms = cli.terms()?;
    if terms.is_empty() {
        return Err("no search terms given; pass TERMS or --keywords FILE".into());
    }

    let config = cli.harvest_config()?;
    let cancel = CancellationToken::new();

    let harvester = Harvester::new(config, &cli.access_token())?
        .with_progress(catalog_harvest_cli_utils::harvest_progress(&multi))
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after in-flight requests");
            cancel.cancel();
        }
    });

    let start = Instant::now();
    let report = harvester.harvest(&terms).await?;
    let path = snapshot::save_snapshot(&report.records, &cli.output_prefix)?;

    log::info!(
        "Harvested {} records from {} terms in {:.1}s{} -> {}",
        report.records.len(),
        report.stats.terms_searched,
        start.elapsed().as_secs_f64(),
        if report.stats.cancelled {
            " (cancelled)"
        } else {
            ""
        },
        path.display()
    );

    Ok(())
}
