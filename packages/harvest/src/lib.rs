#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Concurrent harvest pipeline for a paginated, rate-limited catalog API.
//!
//! A run walks the search endpoint for each query term, deduplicates the
//! identifiers it finds, fetches a detail payload per identifier and
//! enriches each payload into an [`EnrichedRecord`]. Every request goes
//! through [`CatalogClient`], which owns all retry and backoff behaviour.
//! Individual failures shrink the output; they never abort the run.
//!
//! The entry point is [`Harvester`]:
//!
//! ```ignore
//! let harvester = Harvester::new(HarvestConfig::default(), &token)?;
//! let report = harvester.harvest(&["wireless mouse".to_string()]).await?;
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod metrics;
pub mod pagination;
pub mod progress;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backoff::{BackoffPolicy, Jitter, RetryDecision};
pub use catalog_harvest_models::EnrichedRecord;
pub use client::{CatalogClient, Credential, RequestError};
pub use config::{ConfigError, HarvestConfig};
pub use harvest::{HarvestReport, HarvestStats, Harvester, harvest};
pub use metrics::{MetricsError, ReviewMetricsProvider, SalesMetricsProvider, UnknownMetrics};
pub use progress::{HarvestProgress, ProgressCallback};
pub use transport::{Transport, TransportError};

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Missing credential or unusable configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The HTTP transport could not be constructed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
