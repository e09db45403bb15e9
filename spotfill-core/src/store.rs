use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{PricePoint, StorageError};

/// Persistent write-through cache of price points keyed by timestamp.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Rows with `start <= timestamp <= end`, ascending, tombstones included.
    ///
    /// # Errors
    /// Returns `StorageError` when the backend cannot be read.
    async fn read_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, StorageError>;

    /// Insert points whose timestamp is not yet stored; existing rows are kept.
    ///
    /// Returns the number of rows actually inserted. Writes are batched and
    /// each batch is atomic.
    ///
    /// # Errors
    /// Returns `StorageError` when a batch cannot be committed. Batches
    /// committed before the failure stay committed.
    async fn upsert_many(&self, points: &[PricePoint]) -> Result<u64, StorageError>;
}
