//! Read projections over stored aggregates.
//!
//! Every projection takes the reference instant `as_of` from the caller instead of
//! looking up the newest row itself. Callers that want "relative to the latest data"
//! pass [`latest_bucket`] explicitly. The filtering and statistics are plain functions
//! over record slices and do not need a live store.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::{AggregateStore, StoreResult};
use crate::error::StoreError;
use crate::pipeline::types::AggregateRecord;

pub const RECENT_COUNT_HOURS: i64 = 24;
pub const MEAN_CONFIDENCE_DAYS: i64 = 3;

/// Table-wide statistics relative to `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub as_of: DateTime<Utc>,
    pub total: u64,
    /// Aggregates with a bucket in the 24 hours up to `as_of`.
    pub recent_24h: usize,
    /// Unweighted mean of the known aggregate confidences over the 3 days up to
    /// `as_of`. `None` when no aggregate in that window has a known confidence.
    pub mean_confidence_3d: Option<f64>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

pub async fn latest_bucket<S: AggregateStore + ?Sized>(
    store: &S,
) -> StoreResult<Option<DateTime<Utc>>> {
    Ok(store.bucket_span().await?.map(|(_, latest)| latest))
}

/// Aggregates from the `days` days up to `as_of`, newest first.
pub async fn recent<S: AggregateStore + ?Sized>(
    store: &S,
    as_of: DateTime<Utc>,
    days: i64,
    limit: Option<usize>,
) -> StoreResult<Vec<AggregateRecord>> {
    let from = window_start(as_of, days_span(days)?)?;
    let rows = store.range(from, as_of).await?;
    Ok(newest_first(rows, limit))
}

/// Aggregates from the `days` days up to `as_of` whose confidence is known and at
/// least `min_confidence`, newest first.
pub async fn confident<S: AggregateStore + ?Sized>(
    store: &S,
    min_confidence: f64,
    as_of: DateTime<Utc>,
    days: i64,
) -> StoreResult<Vec<AggregateRecord>> {
    let from = window_start(as_of, days_span(days)?)?;
    let rows = store.range(from, as_of).await?;
    Ok(newest_first(above_confidence(rows, min_confidence), None))
}

pub async fn summary<S: AggregateStore + ?Sized>(
    store: &S,
    as_of: DateTime<Utc>,
) -> StoreResult<Summary> {
    let day_start = window_start(as_of, TimeDelta::hours(RECENT_COUNT_HOURS))?;
    let days_start = window_start(as_of, TimeDelta::days(MEAN_CONFIDENCE_DAYS))?;

    let total = store.count().await?;
    let span = store.bucket_span().await?;
    let last_day = store.range(day_start, as_of).await?;
    let last_days = store.range(days_start, as_of).await?;

    Ok(Summary {
        as_of,
        total,
        recent_24h: last_day.len(),
        mean_confidence_3d: mean_confidence(&last_days),
        earliest: span.map(|(min, _)| min),
        latest: span.map(|(_, max)| max),
    })
}

/// A window length of `days` whole days. Negative or unrepresentable lengths are errors.
fn days_span(days: i64) -> StoreResult<TimeDelta> {
    if days < 0 {
        return Err(StoreError::InvalidWindow(format!("negative length of {days} days")));
    }
    TimeDelta::try_days(days)
        .ok_or_else(|| StoreError::InvalidWindow(format!("{days} days is out of range")))
}

fn window_start(as_of: DateTime<Utc>, span: TimeDelta) -> StoreResult<DateTime<Utc>> {
    as_of.checked_sub_signed(span).ok_or_else(|| {
        StoreError::InvalidWindow(format!("{span} before {as_of} is out of range"))
    })
}

pub fn newest_first(
    mut records: Vec<AggregateRecord>,
    limit: Option<usize>,
) -> Vec<AggregateRecord> {
    records.sort_by(|a, b| b.bucket.cmp(&a.bucket).then_with(|| a.cell.cmp(&b.cell)));
    if let Some(n) = limit {
        records.truncate(n);
    }
    records
}

/// Unknown confidences never pass the threshold.
pub fn above_confidence(
    records: Vec<AggregateRecord>,
    min_confidence: f64,
) -> Vec<AggregateRecord> {
    records
        .into_iter()
        .filter(|r| r.confidence.is_some_and(|c| c >= min_confidence))
        .collect()
}

pub fn mean_confidence(records: &[AggregateRecord]) -> Option<f64> {
    let known: Vec<f64> = records.iter().filter_map(|r| r.confidence).collect();
    if known.is_empty() {
        None
    } else {
        Some(known.iter().sum::<f64>() / known.len() as f64)
    }
}
