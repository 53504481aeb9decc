//! CSV snapshots of harvested records.

use std::io::Write;
use std::path::PathBuf;

use catalog_harvest_models::EnrichedRecord;
use serde::Serialize;

/// Errors that can occur while writing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The output file could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The image list could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One CSV row. The image list is flattened to a JSON string column
/// since CSV has no nested values.
#[derive(Serialize)]
struct SnapshotRow<'a> {
    identifier: &'a str,
    item_name: Option<&'a str>,
    brand: Option<&'a str>,
    image_count: usize,
    main_image_url: Option<&'a str>,
    has_aplus: bool,
    has_brand_story: bool,
    review_count: Option<u64>,
    avg_rating: Option<f64>,
    best_rank: Option<i64>,
    rank_paths: &'a str,
    units_per_month: Option<f64>,
    sales_velocity_daily: Option<f64>,
    product_url: &'a str,
    images: String,
}

impl<'a> SnapshotRow<'a> {
    fn from_record(record: &'a EnrichedRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            identifier: &record.identifier,
            item_name: record.item_name.as_deref(),
            brand: record.brand.as_deref(),
            image_count: record.image_count,
            main_image_url: record.main_image_url.as_deref(),
            has_aplus: record.has_aplus,
            has_brand_story: record.has_brand_story,
            review_count: record.review_count,
            avg_rating: record.avg_rating,
            best_rank: record.best_rank,
            rank_paths: &record.rank_paths,
            units_per_month: record.units_per_month,
            sales_velocity_daily: record.sales_velocity_daily,
            product_url: &record.product_url,
            images: serde_json::to_string(&record.images)?,
        })
    }
}

/// Writes `records` as CSV with a header row.
///
/// # Errors
///
/// Returns [`SnapshotError`] if a row cannot be serialized or written.
pub fn write_records<W: Write>(writer: W, records: &[EnrichedRecord]) -> Result<(), SnapshotError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(SnapshotRow::from_record(record)?)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Path of a snapshot taken now: `<prefix>_<unix-seconds>.csv`.
#[must_use]
pub fn snapshot_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}_{}.csv", chrono::Utc::now().timestamp()))
}

/// Writes `records` to a fresh timestamped file and returns its path.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the file cannot be created or written.
pub fn save_snapshot(records: &[EnrichedRecord], prefix: &str) -> Result<PathBuf, SnapshotError> {
    let path = snapshot_path(prefix);
    let file = std::fs::File::create(&path)?;
    write_records(std::io::BufWriter::new(file), records)?;
    log::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(path)
}
