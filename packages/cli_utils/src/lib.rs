#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the catalog harvest binaries.
//!
//! [`IndicatifProgress`] renders a pipeline stage through `indicatif`
//! behind the core's [`ProgressCallback`] trait. [`init_logger`] installs
//! `pretty_env_logger` through `indicatif-log-bridge` so log lines are
//! printed above the bars instead of through them.

use std::io::IsTerminal as _;
use std::sync::Arc;
use std::time::Duration;

use catalog_harvest::progress::{HarvestProgress, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] driven by one pipeline stage.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style applied once the stage reports its total.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a stage bar to `multi`.
    ///
    /// The bar spins until the stage calls
    /// [`ProgressCallback::set_total()`], then shows position, percentage
    /// and ETA in `color`.
    #[must_use]
    pub fn stage_bar(multi: &MultiProgress, message: &str, color: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(&format!("{{spinner:.{color}}} {{msg}}"))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(&format!(
            "  {{msg}} {{wide_bar:.{color}/dim}} {{pos}}/{{len}} {{percent}}% [{{eta}}]"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, bar_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// One bar per harvest stage: discovery, detail fetch and enrichment.
#[must_use]
pub fn harvest_progress(multi: &MultiProgress) -> HarvestProgress {
    HarvestProgress {
        discovery: IndicatifProgress::stage_bar(multi, "Searching keywords", "green"),
        fetch: IndicatifProgress::stage_bar(multi, "Fetching details", "cyan"),
        enrich: IndicatifProgress::stage_bar(multi, "Enriching", "yellow"),
    }
}

/// Asks for a secret on the terminal without echoing it.
///
/// Returns `None` when stdin is not a terminal, the prompt fails, or the
/// answer is blank.
#[must_use]
pub fn prompt_secret(prompt: &str) -> Option<String> {
    if !std::io::stdin().is_terminal() {
        return None;
    }

    dialoguer::Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map_err(|e| log::debug!("Secret prompt failed: {e}"))
        .ok()
        .filter(|secret| !secret.trim().is_empty())
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A logger may already be installed (tests).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
