//! Cursor-based pagination over the catalog search endpoint.
//!
//! Each search page lists matching items and, when more results exist, a
//! `pagination.nextToken` cursor that must be echoed back as `pageToken` on
//! the next request. The walker follows the cursor until it runs out or a
//! page budget is reached.

use std::time::Duration;

use catalog_harvest_models::IdentifierSet;

use crate::client::{CatalogClient, Credential};
use crate::config::HarvestConfig;

/// Search endpoint path.
pub const SEARCH_PATH: &str = "/catalog/2022-04-01/items";

/// Page budget and pacing for one walk.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    /// Maximum pages requested.
    pub max_pages: u32,
    /// Requested page size (already capped by the caller).
    pub page_size: u32,
    /// Pause between consecutive pages.
    pub page_delay: Duration,
}

impl PageLimits {
    /// Limits derived from a run configuration.
    #[must_use]
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            page_size: config.effective_page_size(),
            page_delay: config.page_delay(),
        }
    }
}

/// Walks every search page for `term`, returning identifiers in first-seen
/// order with duplicates removed.
///
/// A request that fails terminally ends the walk early; the identifiers
/// gathered up to that point are still returned, since a partial discovery
/// is useful to the caller. Cancellation ends the walk the same way.
pub async fn discover(
    client: &CatalogClient,
    credential: &Credential,
    config: &HarvestConfig,
    term: &str,
    limits: PageLimits,
) -> Vec<String> {
    let mut identifiers = IdentifierSet::new();
    let mut cursor: Option<String> = None;
    let mut page_count: u32 = 0;
    let page_size = limits.page_size.to_string();

    while page_count < limits.max_pages {
        let mut query = vec![
            ("marketplaceIds", config.marketplace_id.as_str()),
            ("keywords", term),
            ("pageSize", page_size.as_str()),
            ("includedData", "summaries"),
        ];
        if let Some(token) = cursor.as_deref() {
            query.push(("pageToken", token));
        }

        log::debug!("Searching '{term}' page {page_count}");

        let body = match client.request(SEARCH_PATH, &query, credential).await {
            Ok(body) => body,
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                log::warn!(
                    "Search for '{term}' stopped after {page_count} pages ({} identifiers): {e}",
                    identifiers.len()
                );
                break;
            }
        };

        identifiers.extend(extract_identifiers(&body));
        cursor = extract_cursor(&body);
        page_count += 1;

        if cursor.is_none() {
            break;
        }

        if !limits.page_delay.is_zero() && page_count < limits.max_pages {
            tokio::time::sleep(limits.page_delay).await;
        }
    }

    log::info!(
        "Search '{term}': {} identifiers from {page_count} pages",
        identifiers.len()
    );
    identifiers.into_vec()
}

/// Pulls `items[].asin` out of a search page, skipping empty values.
fn extract_identifiers(body: &serde_json::Value) -> Vec<String> {
    body.get("items")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("asin")?.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads the next-page cursor; an empty token means there are no more pages.
fn extract_cursor(body: &serde_json::Value) -> Option<String> {
    body.get("pagination")?
        .get("nextToken")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
