//! Field derivation from raw catalog detail payloads.
//!
//! Detail payloads are kept as [`serde_json::Value`] because the catalog
//! schema varies by marketplace and `includedData`. Every helper here
//! tolerates missing or oddly typed fields and falls back to "absent".

use catalog_harvest_models::{
    ContentFlags, EnrichedRecord, ImageEntry, ReviewMetrics, SalesMetrics, SalesRank,
};
use serde_json::Value;

/// Variant tag of the primary display image.
const MAIN_VARIANT: &str = "MAIN";

/// Flattens `images[].images[]` across every marketplace block.
#[must_use]
pub fn flatten_images(detail: &Value) -> Vec<ImageEntry> {
    let Some(blocks) = detail.get("images").and_then(Value::as_array) else {
        return Vec::new();
    };

    blocks
        .iter()
        .filter_map(|block| block.get("images").and_then(Value::as_array))
        .flatten()
        .map(|image| ImageEntry {
            variant: string_field(image, "variant"),
            url: string_field(image, "link"),
            width: image.get("width").and_then(Value::as_u64),
            height: image.get("height").and_then(Value::as_u64),
        })
        .collect()
}

/// URL of the first image tagged `MAIN` (case-insensitive).
#[must_use]
pub fn main_image_url(images: &[ImageEntry]) -> Option<String> {
    images
        .iter()
        .find(|image| {
            image
                .variant
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case(MAIN_VARIANT))
        })
        .and_then(|image| image.url.clone())
}

/// Collects every `(category, rank)` pair under `salesRanks`.
///
/// `salesRanks` may be a single object or a list of per-marketplace
/// objects; both `classificationRanks` and `displayGroupRanks` are read.
/// Entries whose rank is not an integer are skipped.
#[must_use]
pub fn collect_sales_ranks(detail: &Value) -> Vec<SalesRank> {
    let mut ranks = Vec::new();

    match detail.get("salesRanks") {
        Some(entry @ Value::Object(_)) => consume_rank_groups(entry, &mut ranks),
        Some(Value::Array(entries)) => {
            for entry in entries.iter().filter(|e| e.is_object()) {
                consume_rank_groups(entry, &mut ranks);
            }
        }
        _ => {}
    }

    ranks
}

fn consume_rank_groups(entry: &Value, ranks: &mut Vec<SalesRank>) {
    for group in ["classificationRanks", "displayGroupRanks"] {
        let Some(nodes) = entry.get(group).and_then(Value::as_array) else {
            continue;
        };
        for node in nodes.iter().filter(|n| n.is_object()) {
            let Some(rank) = node.get("rank").and_then(parse_rank) else {
                continue;
            };
            let category = string_field(node, "title")
                .filter(|t| !t.is_empty())
                .or_else(|| string_field(node, "classificationId"))
                .unwrap_or_default();
            ranks.push(SalesRank { category, rank });
        }
    }
}

/// Accepts integer ranks given as numbers (including integral floats such
/// as `300.0`) or numeric strings.
fn parse_rank(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral_float)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_float(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64)
        .then(|| value as i64)
}

/// Lowest rank across every category.
#[must_use]
pub fn best_rank(ranks: &[SalesRank]) -> Option<i64> {
    ranks.iter().map(|r| r.rank).min()
}

/// Serializes ranks as a JSON array of `[category, rank]` pairs.
#[must_use]
pub fn rank_paths(ranks: &[SalesRank]) -> String {
    let pairs: Vec<(&str, i64)> = ranks.iter().map(|r| (r.category.as_str(), r.rank)).collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

/// Everything gathered for one identifier besides the detail payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Enrichment {
    /// Enhanced content flags.
    pub content: ContentFlags,
    /// Review metrics (unknown unless a provider supplied them).
    pub reviews: ReviewMetrics,
    /// Sales metrics (unknown unless a provider supplied them).
    pub sales: SalesMetrics,
}

/// Assembles the output row for `identifier`.
#[must_use]
pub fn build_record(
    identifier: &str,
    detail: &Value,
    enrichment: Enrichment,
    product_url: String,
) -> EnrichedRecord {
    let summary = detail
        .get("summaries")
        .and_then(Value::as_array)
        .and_then(|s| s.first());
    let images = flatten_images(detail);
    let ranks = collect_sales_ranks(detail);

    EnrichedRecord {
        identifier: identifier.to_owned(),
        item_name: summary.and_then(|s| string_field(s, "itemName")),
        brand: summary.and_then(|s| string_field(s, "brand")),
        image_count: images.len(),
        main_image_url: main_image_url(&images),
        has_aplus: enrichment.content.has_aplus,
        has_brand_story: enrichment.content.has_brand_story,
        review_count: enrichment.reviews.review_count,
        avg_rating: enrichment.reviews.avg_rating,
        best_rank: best_rank(&ranks),
        rank_paths: rank_paths(&ranks),
        units_per_month: enrichment.sales.units_per_month,
        sales_velocity_daily: enrichment.sales.sales_velocity_daily,
        product_url,
        images,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}
