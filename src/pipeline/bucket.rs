//! Acquisition timestamps and fixed-width time buckets.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::error::RecordError;

/// Floors `timestamp` to the nearest lower multiple of `width` counted from the
/// Unix epoch. Widths that divide a day keep every boundary aligned to midnight UTC.
pub fn bucket(timestamp: DateTime<Utc>, width: TimeDelta) -> DateTime<Utc> {
    let width_secs = width.num_seconds().max(1);
    let secs = timestamp.timestamp();
    let floored = secs - secs.rem_euclid(width_secs);
    DateTime::from_timestamp(floored, 0).unwrap_or(timestamp)
}

/// Combines the feed's separate `acq_date` and `acq_time` fields into one UTC instant.
///
/// The date is `YYYY-MM-DD`. The time is either `HHMM` digits, with leading zeros
/// possibly dropped (`42` is 00:42), or `HH:MM[:SS]`.
pub fn acquisition_time(acq_date: &str, acq_time: &str) -> Result<DateTime<Utc>, RecordError> {
    let date = NaiveDate::parse_from_str(acq_date.trim(), "%Y-%m-%d")
        .map_err(|e| RecordError::InvalidTimestamp(format!("date '{acq_date}': {e}")))?;
    let time = parse_time(acq_time.trim())
        .ok_or_else(|| RecordError::InvalidTimestamp(format!("time '{acq_time}'")))?;
    Ok(date.and_time(time).and_utc())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    if s.contains(':') {
        return NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok();
    }

    if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hhmm: u32 = s.parse().ok()?;
    NaiveTime::from_hms_opt(hhmm / 100, hhmm % 100, 0)
}
