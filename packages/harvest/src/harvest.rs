//! Run orchestration: discovery, then fetch, then enrich.

use std::sync::Arc;

use catalog_harvest_models::{EnrichedRecord, IdentifierSet};
use tokio_util::sync::CancellationToken;

use crate::HarvestError;
use crate::client::{CatalogClient, Credential};
use crate::config::HarvestConfig;
use crate::enrich::{EnrichProviders, enrich_all};
use crate::fetch::fetch_all;
use crate::metrics::{ReviewMetricsProvider, SalesMetricsProvider};
use crate::pagination::{PageLimits, discover};
use crate::progress::HarvestProgress;
use crate::transport::{ReqwestTransport, Transport};

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Non-blank terms whose discovery ran.
    pub terms_searched: usize,
    /// Distinct identifiers found across all terms.
    pub discovered: usize,
    /// Identifiers kept after the `max_identifiers` cap.
    pub selected: usize,
    /// Details fetched successfully.
    pub fetched: usize,
    /// Detail fetches that failed terminally.
    pub fetch_failed: usize,
    /// Records produced by the enrich stage.
    pub enriched: usize,
    /// Identifiers that did not become records.
    pub enrich_skipped: usize,
    /// Whether the run was cancelled before completing.
    pub cancelled: bool,
}

/// Result of a run: the records plus how they were arrived at.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    /// Records in discovery order.
    pub records: Vec<EnrichedRecord>,
    /// Run counters.
    pub stats: HarvestStats,
}

/// Drives one harvest run against the catalog API.
pub struct Harvester {
    client: CatalogClient,
    credential: Credential,
    config: HarvestConfig,
    providers: EnrichProviders,
    progress: HarvestProgress,
}

impl Harvester {
    /// Builds a harvester that talks to `config.base_url` over HTTPS.
    ///
    /// # Errors
    ///
    /// * [`HarvestError::Configuration`] if `credential` is empty
    /// * [`HarvestError::Transport`] if the HTTP client cannot be built
    pub fn new(config: HarvestConfig, credential: &str) -> Result<Self, HarvestError> {
        let transport = ReqwestTransport::new(&config.base_url, config.request_timeout())?;
        Self::with_transport(Arc::new(transport), config, credential)
    }

    /// Builds a harvester on top of an arbitrary [`Transport`].
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] if `credential` is empty.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        config: HarvestConfig,
        credential: &str,
    ) -> Result<Self, HarvestError> {
        let credential = Credential::new(credential)?;
        let client = CatalogClient::new(transport, config.backoff_policy());

        Ok(Self {
            client,
            credential,
            config,
            providers: EnrichProviders::default(),
            progress: HarvestProgress::silent(),
        })
    }

    /// Uses `provider` for review metrics when `fetch_reviews` is set.
    #[must_use]
    pub fn with_review_provider(mut self, provider: Arc<dyn ReviewMetricsProvider>) -> Self {
        self.providers.reviews = provider;
        self
    }

    /// Uses `provider` for sales metrics when `fetch_sales` is set.
    #[must_use]
    pub fn with_sales_provider(mut self, provider: Arc<dyn SalesMetricsProvider>) -> Self {
        self.providers.sales = provider;
        self
    }

    /// Reports stage progress through `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: HarvestProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Stops the run when `cancel` fires. Records already enriched are
    /// still returned.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.client = self.client.with_cancellation(cancel);
        self
    }

    /// The configuration this harvester runs with.
    #[must_use]
    pub const fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Runs discovery for every term, then fetches and enriches the
    /// deduplicated, capped identifier list.
    ///
    /// Per-identifier failures only shrink the output; they are counted in
    /// [`HarvestStats`].
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] if the configuration is
    /// invalid. No request is made in that case.
    pub async fn harvest(&self, terms: &[String]) -> Result<HarvestReport, HarvestError> {
        self.config.validate()?;

        log::info!(
            "Starting harvest: {} terms, marketplace {}",
            terms.len(),
            self.config.marketplace_id
        );

        let mut stats = HarvestStats::default();

        let discovered = self.discover_terms(terms, &mut stats).await;
        stats.discovered = discovered.len();

        let mut identifiers = discovered.into_vec();
        if identifiers.len() > self.config.max_identifiers {
            log::info!(
                "Capping {} identifiers to {}",
                identifiers.len(),
                self.config.max_identifiers
            );
            identifiers.truncate(self.config.max_identifiers);
        }
        stats.selected = identifiers.len();

        let mut records = Vec::new();

        if identifiers.is_empty() {
            log::info!("No identifiers discovered");
        } else {
            let details = fetch_all(
                &self.client,
                &self.credential,
                &identifiers,
                &self.config,
                &self.progress.fetch,
            )
            .await;
            stats.fetched = details.succeeded();
            stats.fetch_failed = details.failed;

            let batch = enrich_all(
                &self.client,
                &self.credential,
                &details,
                &self.config,
                &self.providers,
                &self.progress.enrich,
            )
            .await;
            stats.enriched = batch.records.len();
            stats.enrich_skipped = stats.selected - stats.enriched;
            records = batch.records;
        }

        stats.cancelled = self.client.is_cancelled();
        if stats.cancelled {
            log::warn!("Harvest cancelled; returning {} records", records.len());
        }

        log::info!(
            "Harvest complete: {} terms, {} discovered, {} selected, {} fetched ({} failed), {} enriched",
            stats.terms_searched,
            stats.discovered,
            stats.selected,
            stats.fetched,
            stats.fetch_failed,
            stats.enriched
        );

        Ok(HarvestReport { records, stats })
    }

    async fn discover_terms(&self, terms: &[String], stats: &mut HarvestStats) -> IdentifierSet {
        let limits = PageLimits::from_config(&self.config);
        let progress = &self.progress.discovery;
        let mut all = IdentifierSet::new();

        progress.set_total(terms.len() as u64);

        for term in terms {
            if self.client.is_cancelled() {
                break;
            }

            let term = term.trim();
            if term.is_empty() {
                progress.inc(1);
                continue;
            }

            progress.set_message(term.to_string());
            let found = discover(&self.client, &self.credential, &self.config, term, limits).await;
            stats.terms_searched += 1;

            let before = all.len();
            all.extend(found);
            log::debug!("'{term}' added {} new identifiers", all.len() - before);
            progress.inc(1);
        }

        progress.finish(format!("Discovered {} identifiers", all.len()));
        all
    }
}

/// Runs a full harvest with the production transport and default metrics
/// providers, returning only the records.
///
/// # Errors
///
/// Returns [`HarvestError`] if the credential or configuration is invalid,
/// or the HTTP client cannot be built.
pub async fn harvest(
    terms: &[String],
    credential: &str,
    config: HarvestConfig,
) -> Result<Vec<EnrichedRecord>, HarvestError> {
    let harvester = Harvester::new(config, credential)?;
    Ok(harvester.harvest(terms).await?.records)
}
