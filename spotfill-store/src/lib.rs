//! spotfill-store
//!
//! `PriceStore` backed by SQLite through `sqlx`.
//!
//! Rows live in a single `electricity_prices` table keyed by UTC timestamp.
//! Writes are insert-if-absent: an existing row, priced or tombstone, is never
//! replaced. Large writes are split into batches that each run in their own
//! transaction.
#![warn(missing_docs)]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use spotfill_core::{PricePoint, PriceStore, StorageError};

/// Rows per insert batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 500;

// SQLite's default SQLITE_MAX_VARIABLE_NUMBER; each row binds two parameters.
const MAX_BIND_PARAMS: usize = 32_766;
const PARAMS_PER_ROW: usize = 2;

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS electricity_prices (
        timestamp DATETIME PRIMARY KEY NOT NULL,
        price REAL NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_electricity_prices_timestamp ON electricity_prices(timestamp)",
];

fn storage_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |e| StorageError::new(operation, e.to_string())
}

/// SQLite implementation of [`PriceStore`].
#[derive(Debug, Clone)]
pub struct SqlitePriceStore {
    pool: SqlitePool,
    batch_size: usize,
}

impl SqlitePriceStore {
    /// Open (creating if needed) the database at `url` and bootstrap the schema.
    ///
    /// The database runs in WAL mode with a generous busy timeout so that
    /// overlapping fills from several tasks wait instead of failing.
    ///
    /// # Errors
    /// Returns `StorageError` when the URL is malformed, the file cannot be
    /// opened, or the schema cannot be created.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "spotfill::store::connect", skip_all)
    )]
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err("connect"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(storage_err("connect"))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, mainly for tests.
    ///
    /// The pool is pinned to one connection that is never recycled, because
    /// every SQLite in-memory connection is a separate database.
    ///
    /// # Errors
    /// Returns `StorageError` when the schema cannot be created.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage_err("connect"))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err("connect"))?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and bootstrap the schema on it.
    ///
    /// # Errors
    /// Returns `StorageError` when the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .map_err(storage_err("init_schema"))?;
        }

        #[cfg(feature = "tracing")]
        tracing::info!("electricity_prices schema ready");

        Ok(Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Override the number of rows written per batch.
    ///
    /// The value is clamped to `1..=16383` so a batch never exceeds SQLite's
    /// bind-parameter limit.
    #[must_use]
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.clamp(1, MAX_BIND_PARAMS / PARAMS_PER_ROW);
        self
    }

    /// Rows written per batch.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Total number of stored rows, tombstones included.
    ///
    /// # Errors
    /// Returns `StorageError` when the count query fails.
    pub async fn count(&self) -> Result<i64, StorageError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM electricity_prices")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err("count"))
    }

    async fn insert_batch(&self, batch: &[PricePoint]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_err("upsert_many"))?;

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("INSERT INTO electricity_prices (timestamp, price) ");
        qb.push_values(batch, |mut b, p| {
            b.push_bind(p.timestamp).push_bind(p.price);
        });
        qb.push(" ON CONFLICT (timestamp) DO NOTHING");

        let result = qb
            .build()
            .execute(&mut *tx)
            .await
            .map_err(storage_err("upsert_many"))?;
        tx.commit().await.map_err(storage_err("upsert_many"))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PriceStore for SqlitePriceStore {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "spotfill::store::read_range", skip(self), fields(start = %start, end = %end))
    )]
    async fn read_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, StorageError> {
        let rows: Vec<(DateTime<Utc>, Option<f64>)> = sqlx::query_as(
            "SELECT timestamp, price FROM electricity_prices \
             WHERE timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err("read_range"))?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, price)| PricePoint { timestamp, price })
            .collect())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "spotfill::store::upsert_many", skip(self, points), fields(points = points.len()))
    )]
    async fn upsert_many(&self, points: &[PricePoint]) -> Result<u64, StorageError> {
        let mut inserted = 0u64;
        for batch in points.chunks(self.batch_size) {
            let n = self.insert_batch(batch).await?;

            #[cfg(feature = "tracing")]
            tracing::debug!(rows = batch.len(), inserted = n, "committed batch");

            inserted += n;
        }
        Ok(inserted)
    }
}
