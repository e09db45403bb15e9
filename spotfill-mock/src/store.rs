use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use spotfill_core::{PricePoint, PriceStore, StorageError};

/// In-memory `PriceStore` with insert-if-absent semantics and failure injection.
#[derive(Default)]
pub struct MemoryPriceStore {
    rows: Mutex<BTreeMap<DateTime<Utc>, Option<f64>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryPriceStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `points` (first occurrence of a timestamp wins).
    #[must_use]
    pub fn with_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let mut rows = BTreeMap::new();
        for p in points {
            rows.entry(p.timestamp).or_insert(p.price);
        }
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Make every subsequent `read_range` fail.
    pub fn set_fail_reads(&self, yes: bool) {
        self.fail_reads.store(yes, Ordering::SeqCst);
    }

    /// Make every subsequent `upsert_many` fail.
    pub fn set_fail_writes(&self, yes: bool) {
        self.fail_writes.store(yes, Ordering::SeqCst);
    }

    /// All stored rows, ascending.
    pub async fn snapshot(&self) -> Vec<PricePoint> {
        self.rows
            .lock()
            .await
            .iter()
            .map(|(ts, price)| PricePoint {
                timestamp: *ts,
                price: *price,
            })
            .collect()
    }

    /// Number of `read_range` calls received.
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `upsert_many` calls received, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn read_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::new("read_range", "injected read failure"));
        }
        if start > end {
            return Ok(Vec::new());
        }
        let rows = self.rows.lock().await;
        Ok(rows
            .range(start..=end)
            .map(|(ts, price)| PricePoint {
                timestamp: *ts,
                price: *price,
            })
            .collect())
    }

    async fn upsert_many(&self, points: &[PricePoint]) -> Result<u64, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::new("upsert_many", "injected write failure"));
        }
        let mut rows = self.rows.lock().await;
        let mut inserted = 0u64;
        for p in points {
            if let std::collections::btree_map::Entry::Vacant(v) = rows.entry(p.timestamp) {
                v.insert(p.price);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
