//! Output formatting and persistence for run reports and aggregates.
//!
//! Supports pretty-printing, JSON serialization, CSV append of run reports and
//! CSV export of an aggregate set.

use anyhow::Result;
use tracing::{debug, info};

use crate::pipeline::types::AggregateRecord;
use crate::stats::RunReport;
use csv::WriterBuilder;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Logs a run report using Rust's debug pretty-print format.
pub fn print_pretty(report: &RunReport) {
    debug!("{:#?}", report);
}

/// Logs a run report as pretty-printed JSON.
pub fn print_json(report: &RunReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Appends a [`RunReport`] as a row to a CSV run log.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, report: &RunReport) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(report)?;
    writer.flush()?;

    Ok(())
}

/// Writes an aggregate set to `path` as CSV, replacing any previous file.
/// Unknown values are written as empty fields.
pub fn write_aggregates(path: impl AsRef<Path>, records: &[AggregateRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().from_writer(File::create(path)?);
    for r in records {
        writer.serialize(r)?;
    }
    writer.flush()?;

    info!(path = %path.display(), records = records.len(), "Aggregates exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::spatial::index;
    use chrono::{TimeZone, Utc};
    use h3o::Resolution;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        let report = RunReport::default();
        print_pretty(&report);
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let report = RunReport::default();
        print_json(&report).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("hotspot_etl_test_header.csv");
        let _ = fs::remove_file(&path);

        let report = RunReport::default();
        append_record(&path, &report).unwrap();
        append_record(&path, &report).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_aggregates_keeps_unknowns_empty() {
        let path = temp_path("hotspot_etl_test_export.csv");
        let record = AggregateRecord {
            cell: index(37.5, -120.2, Resolution::Six).unwrap(),
            bucket: Utc.with_ymd_and_hms(2024, 8, 1, 1, 0, 0).unwrap(),
            confidence: Some(2.0),
            frp_total: None,
            daynight: Some('N'),
        };

        write_aggregates(&path, &[record.clone()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "cell,bucket,confidence,frp_total,daynight");
        assert_eq!(
            lines[1],
            format!("{},2024-08-01T01:00:00Z,2.0,,N", record.cell)
        );

        fs::remove_file(&path).unwrap();
    }
}
