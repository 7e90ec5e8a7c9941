//! Error types for the hotspot pipeline.
//!
//! [`RecordError`] covers single detections and never aborts a batch. Everything
//! else ends the run and surfaces as a [`PipelineError`].

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a single detection was skipped or degraded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid confidence: {0}")]
    InvalidConfidence(String),

    #[error("invalid power: {0}")]
    InvalidPower(String),
}

impl RecordError {
    /// Short stable name used in logs and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::InvalidCoordinate(_) => "invalid_coordinate",
            RecordError::InvalidTimestamp(_) => "invalid_timestamp",
            RecordError::InvalidConfidence(_) => "invalid_confidence",
            RecordError::InvalidPower(_) => "invalid_power",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("invalid query window: {0}")]
    InvalidWindow(String),
}

/// Run-level failures. Any of these ends the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("feed fetch failed: {0}")]
    Fetch(String),

    #[error("feed parse failed: {0}")]
    Parse(#[from] csv::Error),

    #[error("feed schema error: {0}")]
    Schema(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("store write timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("archive failed: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Store(StoreError::Database(e))
    }
}

pub fn fetch_error(msg: impl ToString) -> PipelineError {
    PipelineError::Fetch(msg.to_string())
}

pub fn invalid_config(msg: impl ToString) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
