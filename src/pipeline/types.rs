//! Data types flowing through the aggregation pipeline.
//!
//! `None` marks an Unknown value everywhere below. Unknowns are carried through,
//! never coerced to zero.

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::error::RecordError;

/// A single row parsed from the upstream FIRMS CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Zero-based index of the data row in the feed; the arrival order.
    pub row: usize,
    pub latitude: f64,
    pub longitude: f64,
    pub acq_date: String,
    pub acq_time: String,
    pub confidence: String,
    pub frp: Option<String>,
    pub daynight: String,
}

/// One detection mapped onto the (cell, bucket) grid.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Arrival index of the source row, copied from [`RawDetection::row`].
    pub seq: usize,
    pub cell: CellIndex,
    pub bucket: DateTime<Utc>,
    pub confidence: Option<u32>,
    pub frp: Option<f64>,
    pub daynight: Option<char>,
}

/// One persisted hotspot aggregate, unique per `(cell, bucket)`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRecord {
    #[serde_as(as = "DisplayFromStr")]
    pub cell: CellIndex,
    pub bucket: DateTime<Utc>,
    pub confidence: Option<f64>,
    pub frp_total: Option<f64>,
    pub daynight: Option<char>,
}

/// A detection dropped from the batch, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub seq: usize,
    pub kind: &'static str,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(seq: usize, err: &RecordError) -> Self {
        Self {
            seq,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Output of normalizing one batch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    pub skipped: Vec<SkippedRecord>,
    /// Records kept with an unrecognized, non-empty confidence label.
    pub unknown_confidence: usize,
    /// Records kept with a non-empty but unusable `frp` value.
    pub unknown_power: usize,
}
