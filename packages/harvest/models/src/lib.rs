#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record types produced by the catalog harvest pipeline.
//!
//! The harvest core discovers catalog identifiers, fetches a raw detail
//! payload for each one and finally assembles an [`EnrichedRecord`] per
//! identifier. These types carry no behaviour beyond construction and
//! deduplication so that serialization collaborators can depend on them
//! without pulling in the HTTP stack.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One image attached to a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Image variant tag (e.g. `"MAIN"`, `"PT01"`, `"SWATCH"`).
    pub variant: Option<String>,
    /// Public URL of the image.
    pub url: Option<String>,
    /// Width in pixels, if reported.
    pub width: Option<u64>,
    /// Height in pixels, if reported.
    pub height: Option<u64>,
}

/// A sales rank within one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRank {
    /// Category title, falling back to the classification id.
    pub category: String,
    /// Rank within the category (lower is better).
    pub rank: i64,
}

/// Whether an entry carries enhanced marketing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlags {
    /// At least one enhanced content document references the entry.
    pub has_aplus: bool,
    /// The referenced document contains a brand story module.
    pub has_brand_story: bool,
}

/// Review metrics for one entry. `None` fields mean "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetrics {
    /// Total number of customer reviews.
    pub review_count: Option<u64>,
    /// Average star rating.
    pub avg_rating: Option<f64>,
}

/// Sales velocity metrics for one entry. `None` fields mean "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    /// Estimated units sold per month.
    pub units_per_month: Option<f64>,
    /// Estimated units sold per day.
    pub sales_velocity_daily: Option<f64>,
}

/// The final output row for one catalog identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// The catalog identifier this row describes.
    pub identifier: String,
    /// Display name from the first summary block.
    pub item_name: Option<String>,
    /// Brand from the first summary block.
    pub brand: Option<String>,
    /// Number of images across all marketplaces.
    pub image_count: usize,
    /// URL of the image tagged `MAIN`, if any.
    pub main_image_url: Option<String>,
    /// Whether enhanced content exists for the entry.
    pub has_aplus: bool,
    /// Whether the enhanced content includes a brand story.
    pub has_brand_story: bool,
    /// Review count, `None` when unknown.
    pub review_count: Option<u64>,
    /// Average rating, `None` when unknown.
    pub avg_rating: Option<f64>,
    /// Best (lowest) sales rank across every reported category.
    pub best_rank: Option<i64>,
    /// JSON array of `[category, rank]` pairs, kept for auditing.
    pub rank_paths: String,
    /// Estimated monthly units, `None` when unknown.
    pub units_per_month: Option<f64>,
    /// Estimated daily sales velocity, `None` when unknown.
    pub sales_velocity_daily: Option<f64>,
    /// Canonical storefront URL for the entry.
    pub product_url: String,
    /// Every image attached to the entry.
    pub images: Vec<ImageEntry>,
}

/// An insertion-ordered set of identifiers.
///
/// Re-inserting an identifier that was already seen is a no-op, so the
/// first-seen position always wins. Empty identifiers are rejected.
#[derive(Debug, Clone, Default)]
pub struct IdentifierSet {
    seen: BTreeSet<String>,
    ordered: Vec<String>,
}

impl IdentifierSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `identifier`, returning `true` if it was not already present.
    pub fn insert(&mut self, identifier: impl Into<String>) -> bool {
        let identifier = identifier.into();
        if identifier.is_empty() || self.seen.contains(&identifier) {
            return false;
        }
        self.seen.insert(identifier.clone());
        self.ordered.push(identifier);
        true
    }

    /// Number of distinct identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no identifiers have been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Whether `identifier` has been inserted.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Iterates identifiers in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    /// Consumes the set, returning identifiers in first-seen order.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

impl<S: Into<String>> Extend<S> for IdentifierSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for identifier in iter {
            self.insert(identifier);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
