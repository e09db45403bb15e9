mod helpers;

use std::sync::Arc;

use helpers::{dt, engine, hourly};
use spotfill::{PricePoint, PriceStore, ProviderManager};
use spotfill_mock::MockProvider;
use spotfill_store::SqlitePriceStore;

#[tokio::test]
async fn fill_persists_into_sqlite_and_reuses_it() {
    let start = dt(2024, 1, 1, 0, 0);
    let end = dt(2024, 1, 1, 2, 0);
    let store = Arc::new(SqlitePriceStore::in_memory().await.unwrap());
    let (p, ctl) = MockProvider::serving("np", 0, hourly(start, 2, 4.0)).await;
    let m = ProviderManager::builder().with_provider(p).build().unwrap();
    let eng = engine(store.clone(), m);

    let first = eng.fill(start, end).await.unwrap();
    assert_eq!(first.len(), 9);
    assert_eq!(first[8], PricePoint::tombstone(end));
    assert_eq!(store.count().await.unwrap(), 9);

    let again = eng.fill(start, end).await.unwrap();
    assert_eq!(again, first);
    assert_eq!(ctl.call_count().await, 1);

    let stored = store.read_range(start, end).await.unwrap();
    assert_eq!(stored, first);
}
