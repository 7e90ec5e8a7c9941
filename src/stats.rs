use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::parser::ParsedFeed;
use crate::pipeline::types::{NormalizedBatch, SkippedRecord};

/// Counters for one pipeline run. One CSV row per run in the run log.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub feed: Option<String>,
    pub table: Option<String>,
    pub fetched_bytes: usize,

    // feed rows
    pub rows: usize,
    pub normalized: usize,

    // skipped rows, by reason
    pub invalid_coordinate: usize,
    pub invalid_timestamp: usize,

    // kept rows with an Unknown field
    pub unknown_confidence: usize,
    pub unknown_power: usize,

    pub aggregates: usize,
    pub written: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    /// Fills the parse and normalization counters.
    pub fn record_batch(&mut self, parsed: &ParsedFeed, batch: &NormalizedBatch) {
        self.rows = parsed.rows.len() + parsed.rejected.len();
        self.normalized = batch.records.len();
        self.unknown_confidence = batch.unknown_confidence;
        self.unknown_power = batch.unknown_power;

        for s in parsed.rejected.iter().chain(&batch.skipped) {
            self.count_skip(s);
        }
    }

    fn count_skip(&mut self, s: &SkippedRecord) {
        match s.kind {
            "invalid_coordinate" => self.invalid_coordinate += 1,
            "invalid_timestamp" => self.invalid_timestamp += 1,
            _ => {}
        }
    }

    pub fn skipped(&self) -> usize {
        self.invalid_coordinate + self.invalid_timestamp
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn skipped_pct(&self) -> f64 {
        Self::pct(self.skipped(), self.rows)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        RunReport {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    /// Set run metadata (feed name and target table)
    pub fn with_run_info(mut self, feed: &str, table: &str) -> Self {
        self.feed = Some(feed.to_string());
        self.table = Some(table.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(RunReport::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(RunReport::pct(50, 100), 50.0);
        assert_eq!(RunReport::pct(1, 4), 25.0);
    }

    #[test]
    fn test_record_batch_counts_skips_from_both_stages() {
        let parsed = ParsedFeed {
            rows: Vec::new(),
            rejected: vec![SkippedRecord::new(
                0,
                &RecordError::InvalidCoordinate("latitude 'x'".into()),
            )],
        };
        let batch = NormalizedBatch {
            skipped: vec![
                SkippedRecord::new(1, &RecordError::InvalidCoordinate("latitude 95".into())),
                SkippedRecord::new(2, &RecordError::InvalidTimestamp("time '9999'".into())),
            ],
            unknown_power: 4,
            ..Default::default()
        };

        let mut report = RunReport::new();
        report.record_batch(&parsed, &batch);

        assert_eq!(report.rows, 1);
        assert_eq!(report.invalid_coordinate, 2);
        assert_eq!(report.invalid_timestamp, 1);
        assert_eq!(report.unknown_power, 4);
        assert_eq!(report.skipped(), 3);
    }

    #[test]
    fn test_from_error_with_run_info() {
        let r =
            RunReport::from_error("fetch_error", "status 500").with_run_info("VIIRS", "hotspots");
        assert_eq!(r.error_type.as_deref(), Some("fetch_error"));
        assert_eq!(r.feed.as_deref(), Some("VIIRS"));
        assert_eq!(r.table.as_deref(), Some("hotspots"));
        assert_eq!(r.written, 0);
    }
}
