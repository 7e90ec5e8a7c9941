//! CSV parser for FIRMS area feeds.

use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, RecordError, Result};
use crate::pipeline::types::{RawDetection, SkippedRecord};

/// Columns every feed variant must carry. Everything else is optional.
pub const REQUIRED_COLUMNS: &[&str] = &["latitude", "longitude", "acq_date", "acq_time"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    latitude: String,
    #[serde(default)]
    longitude: String,
    #[serde(default)]
    acq_date: String,
    #[serde(default)]
    acq_time: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    frp: Option<String>,
    #[serde(default)]
    daynight: String,
}

/// Rows decoded from one feed payload, in feed order.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub rows: Vec<RawDetection>,
    /// Rows that could not be decoded into a detection at all.
    pub rejected: Vec<SkippedRecord>,
}

/// Decodes a FIRMS CSV payload into [`RawDetection`]s.
///
/// # Errors
///
/// Returns an error if the header is unreadable or lacks one of [`REQUIRED_COLUMNS`].
/// Individual rows that fail to decode are listed in [`ParsedFeed::rejected`].
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() && bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(ParsedFeed::default());
    }
    for col in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *col) {
            return Err(PipelineError::Schema(format!("missing column '{col}'")));
        }
    }

    let mut feed = ParsedFeed::default();

    for (row, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let decoded = result
            .map_err(|e| RecordError::InvalidCoordinate(format!("undecodable row: {e}")))
            .and_then(|r| to_detection(row, r));

        match decoded {
            Ok(d) => feed.rows.push(d),
            Err(e) => {
                debug!(row, reason = %e, "Rejecting feed row");
                feed.rejected.push(SkippedRecord::new(row, &e));
            }
        }
    }

    Ok(feed)
}

fn to_detection(row: usize, r: CsvRow) -> std::result::Result<RawDetection, RecordError> {
    let coord = |name: &str, s: &str| {
        s.parse::<f64>()
            .map_err(|_| RecordError::InvalidCoordinate(format!("{name} '{s}'")))
    };

    Ok(RawDetection {
        row,
        latitude: coord("latitude", &r.latitude)?,
        longitude: coord("longitude", &r.longitude)?,
        acq_date: r.acq_date,
        acq_time: r.acq_time,
        confidence: r.confidence,
        frp: r.frp,
        daynight: r.daynight,
    })
}
