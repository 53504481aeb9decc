//! Concurrent detail fetch stage.
//!
//! Issues one catalog detail request per identifier with at most
//! `concurrency` requests in flight. A failed identifier is recorded as
//! absent and never affects its siblings.

use std::sync::Arc;

use futures::stream::{self, StreamExt as _};

use crate::client::{CatalogClient, Credential};
use crate::config::HarvestConfig;
use crate::progress::ProgressCallback;
use crate::transport::encode_path_segment;

/// Detail endpoint path prefix; the identifier is appended.
pub const DETAIL_PATH: &str = "/catalog/2022-04-01/items";

/// Detail payloads keyed by identifier, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct FetchedDetails {
    /// `(identifier, detail)` pairs; `None` marks a failed fetch.
    pub details: Vec<(String, Option<serde_json::Value>)>,
    /// Number of identifiers whose fetch failed.
    pub failed: usize,
}

impl FetchedDetails {
    /// Number of identifiers with a detail payload.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.details.iter().filter(|(_, d)| d.is_some()).count()
    }

    /// The detail payload for `identifier`, if it was fetched.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&serde_json::Value> {
        self.details
            .iter()
            .find(|(id, _)| id == identifier)
            .and_then(|(_, d)| d.as_ref())
    }
}

/// Fetches the detail payload of every identifier.
///
/// Returns only after every started request has settled. When the run is
/// cancelled no further requests start, and identifiers that were not
/// fetched before cancellation are left out of the result entirely.
pub async fn fetch_all(
    client: &CatalogClient,
    credential: &Credential,
    identifiers: &[String],
    config: &HarvestConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> FetchedDetails {
    log::info!(
        "Fetching details for {} identifiers (concurrency={})...",
        identifiers.len(),
        config.concurrency
    );
    progress.set_total(identifiers.len() as u64);

    let marketplace = config.marketplace_id.as_str();
    let included = config.included_data.as_str();

    let mut settled: Vec<(usize, String, Option<serde_json::Value>)> =
        stream::iter(identifiers.iter().enumerate())
            .take_while(|_| futures::future::ready(!client.is_cancelled()))
            .map(|(index, identifier)| async move {
                let path = format!("{DETAIL_PATH}/{}", encode_path_segment(identifier));
                let query = [("marketplaceIds", marketplace), ("includedData", included)];
                let result = client.request(&path, &query, credential).await;
                progress.inc(1);

                match result {
                    Ok(detail) => Some((index, identifier.clone(), Some(detail))),
                    Err(e) if e.is_cancelled() => None,
                    Err(e) => {
                        log::warn!("Detail fetch failed for {identifier}: {e}");
                        Some((index, identifier.clone(), None))
                    }
                }
            })
            .buffer_unordered(config.concurrency.max(1))
            .filter_map(futures::future::ready)
            .collect()
            .await;

    settled.sort_by_key(|(index, _, _)| *index);

    let failed = settled.iter().filter(|(_, _, d)| d.is_none()).count();
    let details: Vec<(String, Option<serde_json::Value>)> = settled
        .into_iter()
        .map(|(_, identifier, detail)| (identifier, detail))
        .collect();

    progress.finish(format!(
        "Fetched {} details ({failed} failed)",
        details.len() - failed
    ));
    log::info!(
        "Detail fetch complete: {} succeeded, {failed} failed",
        details.len() - failed
    );

    FetchedDetails { details, failed }
}
