use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::RecordError;
use crate::pipeline::bucket::{acquisition_time, bucket};
use crate::pipeline::confidence::ConfidenceTable;
use crate::pipeline::spatial::index;
use crate::pipeline::types::{NormalizedBatch, NormalizedRecord, RawDetection, SkippedRecord};

/// A normalized record plus the non-fatal problems found on the way.
#[derive(Debug)]
pub struct Normalized {
    pub record: NormalizedRecord,
    pub degraded: Vec<RecordError>,
}

/// Maps one detection onto the grid.
///
/// Invalid coordinates and timestamps are errors. An unrecognized confidence label
/// or unusable `frp` only turns that field Unknown and is reported in `degraded`.
pub fn normalize(raw: &RawDetection, config: &PipelineConfig) -> Result<Normalized, RecordError> {
    let cell = index(raw.latitude, raw.longitude, config.resolution)?;
    let acquired = acquisition_time(&raw.acq_date, &raw.acq_time)?;

    let mut degraded = Vec::new();

    let confidence = encode_confidence(&config.confidence, &raw.confidence, &mut degraded);
    let frp = parse_power(raw.frp.as_deref(), &mut degraded);

    Ok(Normalized {
        record: NormalizedRecord {
            seq: raw.row,
            cell,
            bucket: bucket(acquired, config.bucket_width),
            confidence,
            frp,
            daynight: parse_daynight(&raw.daynight),
        },
        degraded,
    })
}

/// Normalizes a whole batch, skipping bad records instead of failing.
pub fn normalize_batch(rows: &[RawDetection], config: &PipelineConfig) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in rows {
        match normalize(raw, config) {
            Ok(n) => {
                for issue in &n.degraded {
                    match issue {
                        RecordError::InvalidConfidence(_) => batch.unknown_confidence += 1,
                        RecordError::InvalidPower(_) => batch.unknown_power += 1,
                        _ => {}
                    }
                }
                batch.records.push(n.record);
            }
            Err(e) => {
                debug!(row = raw.row, reason = %e, "Skipping detection");
                batch.skipped.push(SkippedRecord::new(raw.row, &e));
            }
        }
    }

    batch
}

fn encode_confidence(
    table: &ConfidenceTable,
    label: &str,
    degraded: &mut Vec<RecordError>,
) -> Option<u32> {
    let value = table.encode(label);
    if value.is_none() && !label.trim().is_empty() {
        degraded.push(RecordError::InvalidConfidence(label.to_string()));
    }
    value
}

fn parse_power(frp: Option<&str>, degraded: &mut Vec<RecordError>) -> Option<f64> {
    let s = frp.map(str::trim).filter(|s| !s.is_empty())?;
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
        _ => {
            degraded.push(RecordError::InvalidPower(s.to_string()));
            None
        }
    }
}

fn parse_daynight(flag: &str) -> Option<char> {
    let mut chars = flag.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}
