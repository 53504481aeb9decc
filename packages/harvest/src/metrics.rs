//! Pluggable review and sales metrics providers.
//!
//! Review and sales velocity data come from services outside the catalog
//! API. The enrich stage depends on them only through these traits, so a
//! real integration can be dropped in without touching the pipeline. The
//! default [`UnknownMetrics`] reports every metric as unknown.

use async_trait::async_trait;
use catalog_harvest_models::{ReviewMetrics, SalesMetrics};

/// Errors a metrics provider may raise. The enrich stage logs them and
/// treats the metrics as unknown.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The provider could not be reached or answered badly.
    #[error("metrics provider failed: {0}")]
    Provider(String),
}

/// Supplies review count and average rating for an identifier.
#[async_trait]
pub trait ReviewMetricsProvider: Send + Sync {
    /// Looks up review metrics for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the lookup fails.
    async fn review_metrics(&self, identifier: &str) -> Result<ReviewMetrics, MetricsError>;
}

/// Supplies unit sales estimates for an identifier.
#[async_trait]
pub trait SalesMetricsProvider: Send + Sync {
    /// Looks up sales metrics for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the lookup fails.
    async fn sales_metrics(&self, identifier: &str) -> Result<SalesMetrics, MetricsError>;
}

/// Provider that knows nothing: every metric is `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownMetrics;

#[async_trait]
impl ReviewMetricsProvider for UnknownMetrics {
    async fn review_metrics(&self, _identifier: &str) -> Result<ReviewMetrics, MetricsError> {
        Ok(ReviewMetrics::default())
    }
}

#[async_trait]
impl SalesMetricsProvider for UnknownMetrics {
    async fn sales_metrics(&self, _identifier: &str) -> Result<SalesMetrics, MetricsError> {
        Ok(SalesMetrics::default())
    }
}
