//! Durable storage of hotspot aggregates.
//!
//! [`AggregateStore`] is the async trait the pipeline writes through and the
//! read projections in [`query`] read through. [`SqliteStore`] implements it on
//! SQLite via `sqlx`.

pub mod query;
mod sqlite;

pub use sqlite::{DEFAULT_TABLE, SqliteStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use h3o::CellIndex;

use crate::error::StoreError;
use crate::pipeline::types::AggregateRecord;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A table of [`AggregateRecord`]s with primary key `(cell, bucket)`.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Creates the table if absent. Safe to call on every startup.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Inserts or replaces every record in one transaction. Either all records are
    /// written or none are. Returns the number of rows written.
    async fn upsert(&self, records: &[AggregateRecord]) -> StoreResult<usize>;

    async fn get(
        &self,
        cell: CellIndex,
        bucket: DateTime<Utc>,
    ) -> StoreResult<Option<AggregateRecord>>;

    /// All records with `from <= bucket <= to`, ordered by bucket then cell.
    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AggregateRecord>>;

    async fn count(&self) -> StoreResult<u64>;

    /// Earliest and latest stored bucket, `None` for an empty table.
    async fn bucket_span(&self) -> StoreResult<Option<(DateTime<Utc>, DateTime<Utc>)>>;
}
