//! Concurrent enrichment stage.
//!
//! Turns fetched detail payloads into [`EnrichedRecord`]s. Each identifier
//! gets up to two dependent enhanced-content requests plus the optional
//! metrics providers. Failures in any of these degrade to default values;
//! they never drop the record.

use std::sync::Arc;

use catalog_harvest_models::{ContentFlags, EnrichedRecord, ReviewMetrics, SalesMetrics};
use futures::stream::{self, StreamExt as _};

use crate::client::{CatalogClient, Credential};
use crate::config::HarvestConfig;
use crate::extract::{Enrichment, build_record};
use crate::fetch::FetchedDetails;
use crate::metrics::{ReviewMetricsProvider, SalesMetricsProvider, UnknownMetrics};
use crate::progress::ProgressCallback;
use crate::transport::encode_path_segment;

/// Enhanced-content relations endpoint.
pub const CONTENT_RELATIONS_PATH: &str = "/aplus/2020-11-01/contentAsinRelations";

/// Enhanced-content document endpoint; the document key is appended.
pub const CONTENT_DOCUMENTS_PATH: &str = "/aplus/2020-11-01/contentDocuments";

/// Module type marking a brand story section.
const BRAND_STORY_MODULE: &str = "BRAND_STORY";

/// Metrics providers consulted during enrichment.
#[derive(Clone)]
pub struct EnrichProviders {
    /// Review metrics, used when `fetch_reviews` is set.
    pub reviews: Arc<dyn ReviewMetricsProvider>,
    /// Sales metrics, used when `fetch_sales` is set.
    pub sales: Arc<dyn SalesMetricsProvider>,
}

impl Default for EnrichProviders {
    fn default() -> Self {
        Self {
            reviews: Arc::new(UnknownMetrics),
            sales: Arc::new(UnknownMetrics),
        }
    }
}

/// Output of the enrich stage.
#[derive(Debug, Clone, Default)]
pub struct EnrichedBatch {
    /// Records in the order of the fetched details.
    pub records: Vec<EnrichedRecord>,
    /// Identifiers with no detail payload, or abandoned on cancellation.
    pub skipped: usize,
}

/// Enriches every identifier that has a detail payload.
///
/// Identifiers without a payload produce no record. Records are returned
/// in the order of `details`, so identical inputs give identical output.
pub async fn enrich_all(
    client: &CatalogClient,
    credential: &Credential,
    details: &FetchedDetails,
    config: &HarvestConfig,
    providers: &EnrichProviders,
    progress: &Arc<dyn ProgressCallback>,
) -> EnrichedBatch {
    let present: Vec<(usize, &str, &serde_json::Value)> = details
        .details
        .iter()
        .enumerate()
        .filter_map(|(index, (id, detail))| Some((index, id.as_str(), detail.as_ref()?)))
        .collect();

    log::info!(
        "Enriching {} records (concurrency={})...",
        present.len(),
        config.concurrency
    );
    progress.set_total(present.len() as u64);

    let mut produced: Vec<(usize, EnrichedRecord)> = stream::iter(present.iter().copied())
        .take_while(|_| futures::future::ready(!client.is_cancelled()))
        .map(|(index, identifier, detail)| async move {
            let enrichment = Enrichment {
                content: content_flags(client, credential, config, identifier).await,
                reviews: review_metrics(providers, config, identifier).await,
                sales: sales_metrics(providers, config, identifier).await,
            };
            progress.inc(1);

            if client.is_cancelled() {
                return None;
            }

            let record = build_record(
                identifier,
                detail,
                enrichment,
                config.product_url(identifier),
            );
            Some((index, record))
        })
        .buffer_unordered(config.concurrency.max(1))
        .filter_map(futures::future::ready)
        .collect()
        .await;

    produced.sort_by_key(|(index, _)| *index);
    let records: Vec<EnrichedRecord> = produced.into_iter().map(|(_, r)| r).collect();
    let skipped = details.details.len() - records.len();

    progress.finish(format!("Enriched {} records", records.len()));
    log::info!(
        "Enrichment complete: {} records, {skipped} skipped",
        records.len()
    );

    EnrichedBatch { records, skipped }
}

/// Looks up enhanced-content flags with a chained pair of requests.
///
/// The document request only happens when the relations response names a
/// document key. A failure of either request leaves both flags false.
pub async fn content_flags(
    client: &CatalogClient,
    credential: &Credential,
    config: &HarvestConfig,
    identifier: &str,
) -> ContentFlags {
    let marketplace = config.marketplace_id.as_str();

    let relations = match client
        .request(
            CONTENT_RELATIONS_PATH,
            &[("marketplaceId", marketplace), ("asin", identifier)],
            credential,
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            log::debug!("{identifier}: content relations unavailable: {e}");
            return ContentFlags::default();
        }
    };

    let Some(first_reference) = relations
        .pointer("/contentReferenceKeySet/contentReferenceKeys")
        .and_then(serde_json::Value::as_array)
        .and_then(|refs| refs.first())
    else {
        return ContentFlags::default();
    };

    let Some(document_key) = first_reference
        .get("value")
        .and_then(serde_json::Value::as_str)
        .filter(|key| !key.is_empty())
    else {
        log::debug!("{identifier}: content reference without a document key");
        return ContentFlags {
            has_aplus: true,
            has_brand_story: false,
        };
    };

    let document = match client
        .request(
            &format!(
                "{CONTENT_DOCUMENTS_PATH}/{}",
                encode_path_segment(document_key)
            ),
            &[("marketplaceId", marketplace), ("includedDataSet", "CONTENTS")],
            credential,
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            log::debug!("{identifier}: content document {document_key} unavailable: {e}");
            return ContentFlags::default();
        }
    };

    ContentFlags {
        has_aplus: true,
        has_brand_story: has_brand_story(&document),
    }
}

fn has_brand_story(document: &serde_json::Value) -> bool {
    document
        .pointer("/contentRecord/contentModuleList")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|modules| {
            modules.iter().any(|module| {
                module
                    .get("contentModuleType")
                    .and_then(serde_json::Value::as_str)
                    .is_some_and(|t| t.contains(BRAND_STORY_MODULE))
            })
        })
}

async fn review_metrics(
    providers: &EnrichProviders,
    config: &HarvestConfig,
    identifier: &str,
) -> ReviewMetrics {
    if !config.fetch_reviews {
        return ReviewMetrics::default();
    }
    providers
        .reviews
        .review_metrics(identifier)
        .await
        .unwrap_or_else(|e| {
            log::debug!("{identifier}: review metrics unavailable: {e}");
            ReviewMetrics::default()
        })
}

async fn sales_metrics(
    providers: &EnrichProviders,
    config: &HarvestConfig,
    identifier: &str,
) -> SalesMetrics {
    if !config.fetch_sales {
        return SalesMetrics::default();
    }
    providers
        .sales
        .sales_metrics(identifier)
        .await
        .unwrap_or_else(|e| {
            log::debug!("{identifier}: sales metrics unavailable: {e}");
            SalesMetrics::default()
        })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::metrics::MetricsError;
    use crate::progress::null_progress;
    use crate::testing::{ScriptedTransport, deterministic_policy, detail_payload, ok_json, test_config};
    use crate::transport::RawResponse;

    struct FixedReviews;

    #[async_trait]
    impl ReviewMetricsProvider for FixedReviews {
        async fn review_metrics(&self, identifier: &str) -> Result<ReviewMetrics, MetricsError> {
            if identifier == "A2" {
                return Err(MetricsError::Provider("quota exceeded".to_string()));
            }
            Ok(ReviewMetrics {
                review_count: Some(120),
                avg_rating: Some(4.5),
            })
        }
    }

    fn relations(key: Option<&str>) -> RawResponse {
        let keys = key.map_or_else(Vec::new, |k| vec![json!({"value": k})]);
        ok_json(&json!({"contentReferenceKeySet": {"contentReferenceKeys": keys}}))
    }

    fn setup() -> (Arc<ScriptedTransport>, CatalogClient, Credential) {
        let transport = Arc::new(ScriptedTransport::new());
        let client = CatalogClient::new(transport.clone(), deterministic_policy(0));
        (transport, client, Credential::new("t").unwrap())
    }

    fn details(pairs: &[(&str, bool)]) -> FetchedDetails {
        FetchedDetails {
            details: pairs
                .iter()
                .map(|(id, present)| {
                    (id.to_string(), present.then(|| detail_payload(id, &[1500, 300, 9000])))
                })
                .collect(),
            failed: pairs.iter().filter(|(_, p)| !p).count(),
        }
    }

    #[tokio::test]
    async fn skips_second_call_without_reference() {
        let (transport, client, credential) = setup();
        transport.respond(CONTENT_RELATIONS_PATH, relations(None));

        let flags = content_flags(&client, &credential, &test_config(), "A1").await;

        assert_eq!(flags, ContentFlags::default());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn detects_brand_story_through_chained_call() {
        let (transport, client, credential) = setup();
        transport.respond(CONTENT_RELATIONS_PATH, relations(Some("doc-1")));
        transport.respond(
            &format!("{CONTENT_DOCUMENTS_PATH}/doc-1"),
            ok_json(&json!({"contentRecord": {"contentModuleList": [
                {"contentModuleType": "STANDARD_TEXT"},
                {"contentModuleType": "STANDARD_BRAND_STORY"}
            ]}})),
        );

        let flags = content_flags(&client, &credential, &test_config(), "A1").await;

        assert!(flags.has_aplus);
        assert!(flags.has_brand_story);
        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].query_param("includedDataSet"), Some("CONTENTS"));
    }

    #[tokio::test]
    async fn reference_without_key_sets_only_aplus() {
        let (transport, client, credential) = setup();
        transport.respond(
            CONTENT_RELATIONS_PATH,
            ok_json(&json!({"contentReferenceKeySet": {"contentReferenceKeys": [{}]}})),
        );

        let flags = content_flags(&client, &credential, &test_config(), "A1").await;

        assert!(flags.has_aplus);
        assert!(!flags.has_brand_story);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_relations_degrade_to_negative_flags() {
        let (transport, client, credential) = setup();
        transport.respond(
            CONTENT_RELATIONS_PATH,
            RawResponse {
                status: 403,
                retry_after: None,
                body: "forbidden".to_string(),
            },
        );

        let flags = content_flags(&client, &credential, &test_config(), "A1").await;

        assert_eq!(flags, ContentFlags::default());
    }

    #[tokio::test]
    async fn never_fabricates_records_for_missing_details() {
        let (transport, client, credential) = setup();
        transport.respond(CONTENT_RELATIONS_PATH, relations(None));
        let input = details(&[("A1", true), ("A2", false), ("A3", true)]);

        let batch = enrich_all(
            &client,
            &credential,
            &input,
            &test_config(),
            &EnrichProviders::default(),
            &null_progress(),
        )
        .await;

        let ids: Vec<&str> = batch.records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A3"]);
        assert_eq!(batch.skipped, 1);
        assert!(batch.records.len() <= input.details.len());

        let first = &batch.records[0];
        assert_eq!(first.best_rank, Some(300));
        assert_eq!(first.image_count, 2);
        assert_eq!(
            first.main_image_url.as_deref(),
            Some("https://img.example.com/A1-main.jpg")
        );
        assert_eq!(first.product_url, "https://www.amazon.com/dp/A1");
        assert_eq!(first.review_count, None);
    }

    #[tokio::test]
    async fn metrics_providers_are_toggled_and_degrade() {
        let (transport, client, credential) = setup();
        transport.respond(CONTENT_RELATIONS_PATH, relations(None));
        let providers = EnrichProviders {
            reviews: Arc::new(FixedReviews),
            ..EnrichProviders::default()
        };
        let input = details(&[("A1", true), ("A2", true)]);

        let disabled = enrich_all(
            &client,
            &credential,
            &input,
            &test_config(),
            &providers,
            &null_progress(),
        )
        .await;
        assert!(disabled.records.iter().all(|r| r.review_count.is_none()));

        let config = HarvestConfig {
            fetch_reviews: true,
            ..test_config()
        };
        let enabled =
            enrich_all(&client, &credential, &input, &config, &providers, &null_progress()).await;

        assert_eq!(enabled.records.len(), 2);
        assert_eq!(enabled.records[0].review_count, Some(120));
        assert_eq!(enabled.records[0].avg_rating, Some(4.5));
        assert_eq!(enabled.records[1].review_count, None);
        assert_eq!(enabled.records[1].units_per_month, None);
    }

    #[tokio::test]
    async fn failed_document_degrades_both_flags() {
        let (transport, client, credential) = setup();
        transport.respond(CONTENT_RELATIONS_PATH, relations(Some("doc-1")));
        transport.respond(
            &format!("{CONTENT_DOCUMENTS_PATH}/doc-1"),
            RawResponse {
                status: 403,
                retry_after: None,
                body: "forbidden".to_string(),
            },
        );

        let flags = content_flags(&client, &credential, &test_config(), "A1").await;

        assert_eq!(flags, ContentFlags::default());
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn document_key_is_encoded_as_one_segment() {
        let (transport, client, credential) = setup();
        transport.respond(CONTENT_RELATIONS_PATH, relations(Some("doc/1?x")));

        content_flags(&client, &credential, &test_config(), "A1").await;

        let sent = transport.requests();
        assert_eq!(sent[1].path, format!("{CONTENT_DOCUMENTS_PATH}/doc%2F1%3Fx"));
    }

    #[tokio::test]
    async fn cancellation_keeps_records_already_enriched() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(CONTENT_RELATIONS_PATH, relations(None));
        transport.hang(CONTENT_RELATIONS_PATH);
        let cancel = tokio_util::sync::CancellationToken::new();
        let client = CatalogClient::new(transport.clone(), deterministic_policy(0))
            .with_cancellation(cancel.clone());
        let credential = Credential::new("t").unwrap();
        let input = details(&[("A1", true), ("A2", true), ("A3", true)]);
        let config = test_config();
        let providers = EnrichProviders::default();
        let progress = null_progress();

        let trigger = async {
            tokio::task::yield_now().await;
            cancel.cancel();
        };
        let (batch, ()) = tokio::join!(
            enrich_all(&client, &credential, &input, &config, &providers, &progress),
            trigger
        );

        let ids: Vec<&str> = batch.records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A1"]);
        assert_eq!(batch.skipped, 2);
        assert_eq!(transport.request_count(CONTENT_RELATIONS_PATH), 2);
    }
}
