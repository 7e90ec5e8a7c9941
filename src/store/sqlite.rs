use async_trait::async_trait;
use chrono::{DateTime, Utc};
use h3o::CellIndex;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use super::{AggregateStore, StoreResult};
use crate::error::StoreError;
use crate::pipeline::types::AggregateRecord;

pub const DEFAULT_TABLE: &str = "hotspots";

/// SQL text for one table, built once after the table name is validated.
#[derive(Debug)]
struct Statements {
    create_table: String,
    create_index: String,
    upsert: String,
    get: String,
    range: String,
    count: String,
    span: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        let columns = "cell, bucket, confidence, frp_total, daynight";
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table}
                (
                    cell TEXT NOT NULL,
                    bucket TIMESTAMP NOT NULL,
                    confidence REAL,
                    frp_total REAL,
                    daynight CHAR(1),
                    PRIMARY KEY (cell, bucket)
                )
                "#
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {table}_bucket_idx ON {table} (bucket)"
            ),
            upsert: format!(
                r#"
                INSERT INTO {table} ({columns})
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (cell, bucket) DO UPDATE SET
                    confidence = excluded.confidence,
                    frp_total = excluded.frp_total,
                    daynight = excluded.daynight
                "#
            ),
            get: format!("SELECT {columns} FROM {table} WHERE cell = ? AND bucket = ?"),
            range: format!(
                "SELECT {columns} FROM {table} \
                 WHERE bucket >= ? AND bucket <= ? ORDER BY bucket, cell"
            ),
            count: format!("SELECT COUNT(*) FROM {table}"),
            span: format!("SELECT MIN(bucket), MAX(bucket) FROM {table}"),
        }
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
    sql: Statements,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url`, e.g. `sqlite://data/hotspots.db`.
    pub async fn connect(url: &str, table: &str) -> StoreResult<Self> {
        validate_table(table)?;
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        info!(url, table, "Connected to store");
        Ok(Self::with_pool(pool, table))
    }

    /// A private in-memory database. A single connection that is never recycled
    /// keeps the data alive for the life of the store.
    pub async fn in_memory(table: &str) -> StoreResult<Self> {
        validate_table(table)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::with_pool(pool, table))
    }

    fn with_pool(pool: SqlitePool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
            sql: Statements::new(table),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl AggregateStore for SqliteStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(&self.sql.create_table).execute(&self.pool).await?;
        sqlx::query(&self.sql.create_index).execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(table = %self.table, records = records.len()))]
    async fn upsert(&self, records: &[AggregateRecord]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        for r in records {
            upsert_query(&self.sql.upsert, r).execute(&mut *tx).await?;
        }

        // dropping an uncommitted transaction rolls it back
        tx.commit().await?;
        debug!("Upsert committed");
        Ok(records.len())
    }

    async fn get(
        &self,
        cell: CellIndex,
        bucket: DateTime<Utc>,
    ) -> StoreResult<Option<AggregateRecord>> {
        let row = sqlx::query(&self.sql.get)
            .bind(cell.to_string())
            .bind(bucket)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_record).transpose()
    }

    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AggregateRecord>> {
        let rows = sqlx::query(&self.sql.range)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_record).collect()
    }

    async fn count(&self) -> StoreResult<u64> {
        let (n,): (i64,) = sqlx::query_as(&self.sql.count).fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn bucket_span(&self) -> StoreResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let (min, max): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(&self.sql.span).fetch_one(&self.pool).await?;
        Ok(min.zip(max))
    }
}

fn upsert_query<'q>(sql: &'q str, r: &AggregateRecord) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(sql)
        .bind(r.cell.to_string())
        .bind(r.bucket)
        .bind(r.confidence)
        .bind(r.frp_total)
        .bind(r.daynight.map(String::from))
}

fn decode_record(row: &SqliteRow) -> StoreResult<AggregateRecord> {
    let cell: String = row.try_get("cell")?;
    let cell = CellIndex::from_str(&cell)
        .map_err(|e| StoreError::CorruptRow(format!("cell '{cell}': {e}")))?;
    let daynight: Option<String> = row.try_get("daynight")?;

    Ok(AggregateRecord {
        cell,
        bucket: row.try_get("bucket")?,
        confidence: row.try_get("confidence")?,
        frp_total: row.try_get("frp_total")?,
        daynight: daynight.and_then(|s| s.chars().next()),
    })
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
fn validate_table(table: &str) -> StoreResult<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::spatial::index;
    use chrono::TimeZone;
    use h3o::Resolution;
    use std::time::Duration;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, h, 0, 0).unwrap()
    }

    fn record(lat: f64, h: u32, conf: Option<f64>, frp: Option<f64>) -> AggregateRecord {
        AggregateRecord {
            cell: index(lat, -120.0, Resolution::Six).unwrap(),
            bucket: hour(h),
            confidence: conf,
            frp_total: frp,
            daynight: Some('D'),
        }
    }

    async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory(DEFAULT_TABLE).await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[test]
    fn test_validate_table() {
        assert!(validate_table("hotspots").is_ok());
        assert!(validate_table("viirs_historical_data").is_ok());
        assert!(validate_table("_t1").is_ok());
        assert!(validate_table("").is_err());
        assert!(validate_table("1abc").is_err());
        assert!(validate_table("x; DROP TABLE y").is_err());
    }

    #[tokio::test]
    async fn test_ensure_schema_twice() {
        let store = store().await;
        store.ensure_schema().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.bucket_span().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_round_trip_with_unknowns() {
        let store = store().await;
        let mut r = record(37.0, 1, None, None);
        r.daynight = None;
        store.upsert(&[r.clone()]).await.unwrap();

        let back = store.get(r.cell, r.bucket).await.unwrap().unwrap();
        assert_eq!(back, r);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = store().await;
        let batch = vec![
            record(37.0, 1, Some(2.0), Some(12.0)),
            record(38.0, 1, Some(1.0), None),
            record(37.0, 2, None, Some(3.5)),
        ];

        store.upsert(&batch).await.unwrap();
        let first = store.range(hour(0), hour(23)).await.unwrap();
        store.upsert(&batch).await.unwrap();
        let second = store.range(hour(0), hour(23)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let store = store().await;
        let old = record(37.0, 1, Some(1.0), Some(1.0));
        store.upsert(&[old.clone()]).await.unwrap();

        let new = AggregateRecord {
            confidence: Some(3.0),
            frp_total: None,
            daynight: Some('N'),
            ..old.clone()
        };
        store.upsert(&[new.clone()]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(old.cell, old.bucket).await.unwrap(), Some(new));
    }

    #[tokio::test]
    async fn test_range_is_ordered_and_bounded() {
        let store = store().await;
        store
            .upsert(&[
                record(37.0, 5, None, None),
                record(37.0, 1, None, None),
                record(37.0, 3, None, None),
            ])
            .await
            .unwrap();

        let got = store.range(hour(1), hour(3)).await.unwrap();
        let buckets: Vec<_> = got.iter().map(|r| r.bucket).collect();
        assert_eq!(buckets, vec![hour(1), hour(3)]);

        assert_eq!(store.bucket_span().await.unwrap(), Some((hour(1), hour(5))));
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_store_unchanged() {
        let store = store().await;
        let existing = record(37.0, 1, Some(1.0), Some(1.0));
        store.upsert(&[existing.clone()]).await.unwrap();

        // make the second statement of the batch fail
        sqlx::query(
            "CREATE TRIGGER reject_marked_power BEFORE INSERT ON hotspots \
             WHEN NEW.frp_total = 99.0 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let batch = vec![
            AggregateRecord { confidence: Some(3.0), ..existing.clone() },
            record(38.0, 1, None, Some(99.0)),
        ];
        assert!(store.upsert(&batch).await.is_err());

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(existing.cell, existing.bucket).await.unwrap(), Some(existing));
    }

    #[tokio::test]
    async fn test_abandoned_transaction_leaves_store_unchanged() {
        let store = store().await;
        let existing = record(37.0, 1, Some(1.0), Some(1.0));
        store.upsert(&[existing.clone()]).await.unwrap();

        let batch = [
            AggregateRecord { confidence: Some(3.0), ..existing.clone() },
            record(38.0, 1, None, Some(2.0)),
        ];
        // statements run, then the commit never arrives before the deadline
        let stalled = tokio::time::timeout(Duration::from_millis(50), async {
            let mut tx = store.pool.begin().await?;
            for r in &batch {
                upsert_query(&store.sql.upsert, r).execute(&mut *tx).await?;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.commit().await?;
            Ok::<(), sqlx::Error>(())
        })
        .await;
        assert!(stalled.is_err());

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(existing.cell, existing.bucket).await.unwrap(), Some(existing));
    }
}
