//! Pipeline configuration.
//!
//! Stored as a plain JSON object on disk; every field is optional:
//! ```json
//! {
//!   "resolution": 6,
//!   "bucket_minutes": 60,
//!   "confidence": { "l": 1, "n": 2, "h": 3 },
//!   "fetch_timeout_secs": 60,
//!   "connect_timeout_secs": 10,
//!   "store_timeout_secs": 30
//! }
//! ```
//! The file is validated once at startup. Resolution and bucket width define the
//! identity space of stored aggregates, so changing either between runs makes new
//! rows incomparable with old ones.

use chrono::TimeDelta;
use h3o::Resolution;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, invalid_config};
use crate::pipeline::confidence::ConfidenceTable;

pub const DEFAULT_RESOLUTION: u8 = 6;
pub const DEFAULT_BUCKET_MINUTES: i64 = 60;

const MINUTES_PER_DAY: i64 = 24 * 60;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    resolution: u8,
    bucket_minutes: i64,
    confidence: Option<BTreeMap<String, u32>>,
    fetch_timeout_secs: u64,
    connect_timeout_secs: u64,
    store_timeout_secs: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            bucket_minutes: DEFAULT_BUCKET_MINUTES,
            confidence: None,
            fetch_timeout_secs: 60,
            connect_timeout_secs: 10,
            store_timeout_secs: 30,
        }
    }
}

/// Validated settings shared by every stage of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resolution: Resolution,
    pub bucket_width: TimeDelta,
    pub confidence: ConfidenceTable,
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
    pub store_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Six,
            bucket_width: TimeDelta::minutes(DEFAULT_BUCKET_MINUTES),
            confidence: ConfidenceTable::default(),
            fetch_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let resolution = Resolution::try_from(raw.resolution)
            .map_err(|_| invalid_config(format!("resolution {} not in 0..=15", raw.resolution)))?;

        if raw.bucket_minutes <= 0 || MINUTES_PER_DAY % raw.bucket_minutes != 0 {
            return Err(invalid_config(format!(
                "bucket_minutes {} must be positive and divide a day",
                raw.bucket_minutes
            )));
        }

        let confidence = match raw.confidence {
            Some(entries) => ConfidenceTable::new(entries)?,
            None => ConfidenceTable::default(),
        };

        for (name, secs) in [
            ("fetch_timeout_secs", raw.fetch_timeout_secs),
            ("connect_timeout_secs", raw.connect_timeout_secs),
            ("store_timeout_secs", raw.store_timeout_secs),
        ] {
            if secs == 0 {
                return Err(invalid_config(format!("{name} must be positive")));
            }
        }

        Ok(Self {
            resolution,
            bucket_width: TimeDelta::minutes(raw.bucket_minutes),
            confidence,
            fetch_timeout: Duration::from_secs(raw.fetch_timeout_secs),
            connect_timeout: Duration::from_secs(raw.connect_timeout_secs),
            store_timeout: Duration::from_secs(raw.store_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config.resolution, Resolution::Six);
        assert_eq!(config.bucket_width, TimeDelta::minutes(60));
        assert_eq!(config.confidence.encode("h"), Some(3));
    }

    #[test]
    fn test_custom_values() {
        let config = PipelineConfig::from_json(
            r#"{ "resolution": 8, "bucket_minutes": 30, "confidence": { "lo": 1, "hi": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.resolution, Resolution::Eight);
        assert_eq!(config.bucket_width, TimeDelta::minutes(30));
        assert_eq!(config.confidence.encode("hi"), Some(5));
        assert_eq!(config.confidence.encode("h"), None);
    }

    #[test]
    fn test_rejects_bad_resolution() {
        assert!(PipelineConfig::from_json(r#"{ "resolution": 16 }"#).is_err());
    }

    #[test]
    fn test_rejects_bucket_not_dividing_day() {
        assert!(PipelineConfig::from_json(r#"{ "bucket_minutes": 7 }"#).is_err());
        assert!(PipelineConfig::from_json(r#"{ "bucket_minutes": 0 }"#).is_err());
        assert!(PipelineConfig::from_json(r#"{ "bucket_minutes": 1440 }"#).is_ok());
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(PipelineConfig::from_json(r#"{ "bucket_width": 60 }"#).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(PipelineConfig::from_json(r#"{ "store_timeout_secs": 0 }"#).is_err());
    }
}
