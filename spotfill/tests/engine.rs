mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use helpers::{dt, engine, engine_with, hourly, priced, series, timestamps, unbounded};
use spotfill::{
    FillConfig, FillError, PricePoint, ProviderError, ProviderManager, TimeGrid,
    ValidationError,
};
use spotfill_mock::{FixedClock, MemoryPriceStore, MockBehavior, MockController, MockProvider};

async fn single(
    name: &'static str,
    series: Vec<PricePoint>,
) -> (ProviderManager, MockController) {
    let (p, ctl) = MockProvider::serving(name, 0, series).await;
    let m = ProviderManager::builder().with_provider(p).build().unwrap();
    (m, ctl)
}

#[tokio::test]
async fn quarter_hour_scenario_expands_and_tombstones() {
    let store = Arc::new(MemoryPriceStore::new());
    let (m, _) = single("np", vec![priced(dt(2024, 1, 1, 0, 0), 50.0)]).await;
    let eng = engine(store.clone(), m);

    let got = eng
        .fill(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 1, 0))
        .await
        .unwrap();

    assert_eq!(
        got,
        vec![
            priced(dt(2024, 1, 1, 0, 0), 50.0),
            priced(dt(2024, 1, 1, 0, 15), 50.0),
            priced(dt(2024, 1, 1, 0, 30), 50.0),
            priced(dt(2024, 1, 1, 0, 45), 50.0),
            PricePoint::tombstone(dt(2024, 1, 1, 1, 0)),
        ]
    );
    assert_eq!(store.snapshot().await, got);
}

#[tokio::test]
async fn second_fill_is_served_from_the_store() {
    let start = dt(2024, 1, 1, 0, 0);
    let end = dt(2024, 1, 1, 5, 45);
    let store = Arc::new(MemoryPriceStore::new());
    let (m, ctl) = single("np", hourly(start, 6, 10.0)).await;
    let eng = engine(store.clone(), m);

    let first = eng.fill(start, end).await.unwrap();
    let writes = store.write_calls();
    let (second, report) = eng.fill_with_report(start, end).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 24);
    assert_eq!(ctl.call_count().await, 1);
    assert_eq!(store.write_calls(), writes);
    assert_eq!(report.cached, 24);
    assert_eq!(report.fetched, 0);
}

#[tokio::test]
async fn total_failure_writes_nothing_and_propagates() {
    let store = Arc::new(MemoryPriceStore::new());
    let (p, _) = MockProvider::failing("np", 0, ProviderError::status("np", 503, "down")).await;
    let m = ProviderManager::builder().with_provider(p).build().unwrap();
    let eng = engine(store.clone(), m);

    let err = eng
        .fill(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 2, 0))
        .await
        .unwrap_err();

    match err {
        FillError::Provider(ProviderError::Exhausted { tried, last }) => {
            assert_eq!(tried, 1);
            assert_eq!(last.and_then(|e| e.http_status()), Some(503));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(store.snapshot().await.is_empty());
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn total_failure_with_cached_rows_degrades_to_cache() {
    let cached = vec![priced(dt(2024, 1, 1, 0, 0), 1.0)];
    let store = Arc::new(MemoryPriceStore::with_points(cached.clone()));
    let (p, _) = MockProvider::failing("np", 0, ProviderError::api("np", "connection refused")).await;
    let m = ProviderManager::builder().with_provider(p).build().unwrap();
    let eng = engine(store.clone(), m);

    let (got, report) = eng
        .fill_with_report(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 2, 0))
        .await
        .unwrap();

    assert_eq!(got, cached);
    assert!(report.degraded.is_some());
    assert_eq!(report.tombstoned, 0);
    assert_eq!(store.snapshot().await, cached);
}

#[tokio::test]
async fn failure_on_empty_store_can_return_empty() {
    let store = Arc::new(MemoryPriceStore::new());
    let (p, _) = MockProvider::failing("np", 0, ProviderError::api("np", "down")).await;
    let m = ProviderManager::builder().with_provider(p).build().unwrap();
    let cfg = FillConfig {
        propagate_when_empty: false,
        ..unbounded()
    };
    let eng = engine_with(store, m, Arc::new(FixedClock::new(dt(2030, 1, 1, 0, 0))), cfg);

    let got = eng
        .fill(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 2, 0))
        .await
        .unwrap();
    assert!(got.is_empty());
}

#[tokio::test]
async fn missing_span_is_requested_from_its_hour_and_cached_rows_win() {
    let start = dt(2024, 1, 1, 0, 0);
    let cached = vec![
        priced(dt(2024, 1, 1, 0, 0), 1.0),
        priced(dt(2024, 1, 1, 0, 15), 1.0),
        priced(dt(2024, 1, 1, 1, 0), 7.0),
    ];
    let store = Arc::new(MemoryPriceStore::with_points(cached));
    let provider_series = series(start, TimeDelta::minutes(15), 8, 100.0);
    let (m, ctl) = single("np", provider_series).await;
    let eng = engine(store.clone(), m);

    let got = eng.fill(start, dt(2024, 1, 1, 1, 45)).await.unwrap();

    assert_eq!(
        ctl.calls().await,
        vec![(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 1, 45))]
    );
    assert_eq!(got.len(), 8);
    assert_eq!(got[0].price, Some(1.0));
    assert_eq!(got[4].price, Some(7.0));
    assert_eq!(got[2].price, Some(102.0));
}

#[tokio::test]
async fn fine_grained_output_is_not_expanded() {
    let start = dt(2024, 1, 1, 0, 0);
    let store = Arc::new(MemoryPriceStore::new());
    // 00:00 and 00:15 only; the 00:15 point is off the hourly boundary
    let (m, _) = single("np", series(start, TimeDelta::minutes(15), 2, 5.0)).await;
    let eng = engine(store, m);

    let (got, report) = eng
        .fill_with_report(start, dt(2024, 1, 1, 0, 45))
        .await
        .unwrap();
    assert_eq!(got[0].price, Some(5.0));
    assert_eq!(got[1].price, Some(6.0));
    assert!(got[2].is_tombstone());
    assert!(got[3].is_tombstone());
    assert_eq!(report.fetched, 2);
    assert_eq!(report.tombstoned, 2);
}

#[tokio::test]
async fn empty_answers_are_not_a_confirmation() {
    let start = dt(2024, 1, 1, 0, 0);
    let store = Arc::new(MemoryPriceStore::new());
    let (m, ctl) = single("np", Vec::new()).await;
    let eng = engine(store.clone(), m);

    assert!(eng.fill(start, dt(2024, 1, 1, 0, 45)).await.is_err());
    assert!(store.snapshot().await.is_empty());
    assert_eq!(ctl.call_count().await, 1);
}

#[tokio::test]
async fn tombstones_are_not_refetched() {
    let start = dt(2024, 1, 1, 0, 0);
    let end = dt(2024, 1, 1, 1, 0);
    let store = Arc::new(MemoryPriceStore::new());
    let (m, ctl) = single("np", vec![priced(start, 50.0)]).await;
    let eng = engine(store.clone(), m);

    let first = eng.fill(start, end).await.unwrap();
    assert!(first.last().is_some_and(PricePoint::is_tombstone));
    let second = eng.fill(start, end).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ctl.call_count().await, 1);
}

#[tokio::test]
async fn horizon_defers_unpublished_slots() {
    // 10:00 in Helsinki: only today (local) is published; local midnight is 22:00Z
    let now = dt(2024, 1, 15, 8, 0);
    let clock = Arc::new(FixedClock::new(now));
    let store = Arc::new(MemoryPriceStore::new());
    let (m, ctl) = single("np", hourly(dt(2024, 1, 15, 0, 0), 48, 1.0)).await;
    let eng = engine_with(store.clone(), m, clock.clone(), FillConfig::default());

    let start = dt(2024, 1, 15, 12, 0);
    let end = dt(2024, 1, 16, 23, 45);
    let (got, report) = eng.fill_with_report(start, end).await.unwrap();

    assert_eq!(ctl.calls().await, vec![(start, dt(2024, 1, 15, 21, 45))]);
    assert_eq!(got.last().map(|p| p.timestamp), Some(dt(2024, 1, 15, 21, 45)));
    assert!(got.iter().all(|p| !p.is_tombstone()));
    assert_eq!(report.deferred, 26 * 4);

    // After the 14:00 local cutoff the next local day becomes eligible.
    clock.set(dt(2024, 1, 15, 12, 30));
    let got = eng.fill(start, end).await.unwrap();
    assert_eq!(ctl.call_count().await, 2);
    assert_eq!(
        ctl.calls().await[1],
        (dt(2024, 1, 15, 22, 0), dt(2024, 1, 16, 21, 45))
    );
    // Provider data ends at 2024-01-16T23:00Z; nothing past 21:45Z is touched.
    assert_eq!(got.last().map(|p| p.timestamp), Some(dt(2024, 1, 16, 21, 45)));
    assert!(store.snapshot().await.iter().all(|p| !p.is_tombstone()));
}

#[tokio::test]
async fn everything_beyond_horizon_makes_no_calls() {
    let clock = Arc::new(FixedClock::new(dt(2024, 1, 15, 8, 0)));
    let store = Arc::new(MemoryPriceStore::new());
    let (m, ctl) = single("np", Vec::new()).await;
    let eng = engine_with(store.clone(), m, clock, FillConfig::default());

    let (got, report) = eng
        .fill_with_report(dt(2024, 1, 20, 0, 0), dt(2024, 1, 20, 1, 0))
        .await
        .unwrap();
    assert!(got.is_empty());
    assert_eq!(report.deferred, 5);
    assert_eq!(ctl.call_count().await, 0);
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn inverted_range_is_rejected_before_io() {
    let store = Arc::new(MemoryPriceStore::new());
    let (m, ctl) = single("np", Vec::new()).await;
    let eng = engine(store.clone(), m);

    let err = eng
        .fill(dt(2024, 1, 2, 0, 0), dt(2024, 1, 1, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FillError::Validation(ValidationError::InvertedRange { .. })
    ));
    assert_eq!(store.read_calls(), 0);
    assert_eq!(ctl.call_count().await, 0);
}

#[tokio::test]
async fn unaligned_bounds_are_floored_or_rejected() {
    let start = dt(2024, 1, 1, 0, 7);
    let end = dt(2024, 1, 1, 0, 20);

    let store = Arc::new(MemoryPriceStore::new());
    let (m, _) = single("np", hourly(dt(2024, 1, 1, 0, 0), 1, 2.0)).await;
    let eng = engine(store, m);
    let got = eng.fill(start, end).await.unwrap();
    assert_eq!(
        timestamps(&got),
        vec![dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 0, 15)]
    );

    let store = Arc::new(MemoryPriceStore::new());
    let (m, _) = single("np", Vec::new()).await;
    let cfg = FillConfig {
        require_aligned: true,
        ..unbounded()
    };
    let eng = engine_with(store, m, Arc::new(FixedClock::new(dt(2030, 1, 1, 0, 0))), cfg);
    let err = eng.fill(start, end).await.unwrap_err();
    assert!(matches!(
        err,
        FillError::Validation(ValidationError::Unaligned { .. })
    ));
}

#[tokio::test]
async fn read_failure_is_fatal() {
    let store = Arc::new(MemoryPriceStore::new());
    store.set_fail_reads(true);
    let (m, ctl) = single("np", hourly(dt(2024, 1, 1, 0, 0), 1, 1.0)).await;
    let eng = engine(store, m);

    let err = eng
        .fill(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 0, 45))
        .await
        .unwrap_err();
    assert!(matches!(err, FillError::Storage(_)));
    assert_eq!(ctl.call_count().await, 0);
}

#[tokio::test]
async fn write_failure_is_fatal() {
    let store = Arc::new(MemoryPriceStore::new());
    store.set_fail_writes(true);
    let (m, _) = single("np", hourly(dt(2024, 1, 1, 0, 0), 1, 1.0)).await;
    let eng = engine(store.clone(), m);

    let err = eng
        .fill(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 0, 45))
        .await
        .unwrap_err();
    match err {
        FillError::Storage(e) => assert_eq!(e.operation, "upsert_many"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn hourly_grid_passes_hourly_data_through() {
    let start = dt(2024, 1, 1, 0, 0);
    let store = Arc::new(MemoryPriceStore::new());
    let (p, _) = MockProvider::serving("np", 0, hourly(start, 3, 1.0)).await;
    let m = ProviderManager::builder()
        .with_provider(p)
        .grid(TimeGrid::hourly())
        .build()
        .unwrap();
    let cfg = FillConfig {
        grid_step: Duration::from_secs(3600),
        ..unbounded()
    };
    let eng = engine_with(store, m, Arc::new(FixedClock::new(dt(2030, 1, 1, 0, 0))), cfg);

    let got = eng.fill(start, dt(2024, 1, 1, 2, 0)).await.unwrap();
    assert_eq!(got, hourly(start, 3, 1.0));
}

#[tokio::test]
async fn overlapping_fills_converge() {
    let start = dt(2024, 1, 1, 0, 0);
    let end = dt(2024, 1, 1, 3, 45);
    let store = Arc::new(MemoryPriceStore::new());
    let (m, _) = single("np", hourly(start, 4, 1.0)).await;
    let eng = Arc::new(engine(store.clone(), m));

    let (a, b) = tokio::join!(eng.fill(start, end), eng.fill(start, end));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(store.snapshot().await, a);
}

#[tokio::test]
async fn mid_hour_gap_is_filled_from_hourly_data() {
    let start = dt(2024, 1, 1, 0, 0);
    let cached = vec![priced(start, 8.0)];
    let store = Arc::new(MemoryPriceStore::with_points(cached));
    let (m, ctl) = single("np", hourly(start, 2, 20.0)).await;
    let eng = engine(store, m);

    let got = eng.fill(start, dt(2024, 1, 1, 1, 45)).await.unwrap();

    assert_eq!(ctl.calls().await, vec![(start, dt(2024, 1, 1, 1, 45))]);
    let prices: Vec<_> = got.iter().map(|p| p.price).collect();
    assert_eq!(
        prices,
        vec![
            Some(8.0),
            Some(20.0),
            Some(20.0),
            Some(20.0),
            Some(21.0),
            Some(21.0),
            Some(21.0),
            Some(21.0),
        ]
    );
}

#[test]
fn manager_on_another_grid_is_rejected() {
    let (p, _) = MockProvider::new_with_controller("np", 0);
    let m = ProviderManager::builder()
        .with_provider(p)
        .grid(TimeGrid::hourly())
        .build()
        .unwrap();
    let err = spotfill::CacheFillEngine::builder()
        .store(Arc::new(MemoryPriceStore::new()))
        .manager(Arc::new(m))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, ValidationError::InvalidConfig(_)), "{err:?}");
}

/// Quarter-hour expansion of an hourly series starting at index 0.
fn quarters(start: chrono::DateTime<chrono::Utc>, hours: usize, base: f64) -> Vec<PricePoint> {
    hourly(start, hours, base)
        .into_iter()
        .flat_map(|p| (0..4).map(move |q| priced(p.timestamp + TimeDelta::minutes(15 * q), p.price.unwrap())))
        .collect()
}

#[tokio::test]
async fn fill_returns_the_fallback_provider_data() {
    let start = dt(2024, 1, 1, 0, 0);
    let store = Arc::new(MemoryPriceStore::new());
    let (a, a_ctl) =
        MockProvider::failing("a", 0, ProviderError::status("a", 503, "down")).await;
    let (b, b_ctl) = MockProvider::serving("b", 1, hourly(start, 3, 7.0)).await;
    let m = ProviderManager::builder()
        .with_provider(b)
        .with_provider(a)
        .build()
        .unwrap();
    let eng = engine(store.clone(), m);

    let got = eng.fill(start, dt(2024, 1, 1, 2, 45)).await.unwrap();

    assert_eq!(got, quarters(start, 3, 7.0));
    assert_eq!(store.snapshot().await, got);
    // b answers every chunk, so a is only ever called if it went first
    assert_eq!(a_ctl.call_count().await, 1);
    assert_eq!(b_ctl.call_count().await, 1);
}

#[tokio::test]
async fn chunks_filled_by_different_providers_form_one_gapless_series() {
    let day1 = dt(2024, 1, 1, 0, 0);
    let day2 = dt(2024, 1, 2, 0, 0);
    let end = dt(2024, 1, 3, 23, 45);
    let store = Arc::new(MemoryPriceStore::new());

    let (primary, primary_ctl) = MockProvider::serving("primary", 0, hourly(day1, 72, 1.0)).await;
    primary_ctl
        .push_once(MockBehavior::Serve(hourly(day1, 72, 1.0)))
        .await;
    primary_ctl
        .push_once(MockBehavior::Fail(ProviderError::status("primary", 503, "down")))
        .await;
    let (backup, backup_ctl) = MockProvider::serving("backup", 1, hourly(day1, 72, 100.0)).await;

    let m = ProviderManager::builder()
        .with_provider(primary)
        .with_provider(backup)
        .chunk_span(Duration::from_secs(86_400))
        .build()
        .unwrap();
    let eng = engine(store.clone(), m);

    let (got, report) = eng.fill_with_report(day1, end).await.unwrap();

    assert_eq!(timestamps(&got), TimeGrid::quarter_hourly().expected(day1, end));
    assert!(got.iter().all(|p| !p.is_tombstone()));
    let from_backup: Vec<_> = got
        .iter()
        .filter(|p| p.price.is_some_and(|v| v >= 100.0))
        .map(|p| p.timestamp)
        .collect();
    assert_eq!(from_backup, TimeGrid::quarter_hourly().expected(day2, dt(2024, 1, 2, 23, 45)));
    assert_eq!(store.snapshot().await, got);
    assert_eq!(report.tombstoned, 0);
    assert_eq!(report.unconfirmed, 0);
    assert_eq!(primary_ctl.call_count().await, 3);
    assert_eq!(backup_ctl.calls().await, vec![(day2, dt(2024, 1, 2, 23, 45))]);
}

#[tokio::test]
async fn failed_chunks_stay_open_and_are_fetched_again() {
    let day1 = dt(2024, 1, 1, 0, 0);
    let day2 = dt(2024, 1, 2, 0, 0);
    let end = dt(2024, 1, 2, 23, 45);
    let store = Arc::new(MemoryPriceStore::new());

    let (p, ctl) = MockProvider::serving("np", 0, hourly(day1, 48, 1.0)).await;
    ctl.push_once(MockBehavior::Serve(hourly(day1, 48, 1.0))).await;
    ctl.push_once(MockBehavior::Fail(ProviderError::status("np", 503, "down")))
        .await;
    let m = ProviderManager::builder()
        .with_provider(p)
        .chunk_span(Duration::from_secs(86_400))
        .build()
        .unwrap();
    let eng = engine(store.clone(), m);

    let (first, report) = eng.fill_with_report(day1, end).await.unwrap();
    assert_eq!(timestamps(&first), TimeGrid::quarter_hourly().expected(day1, dt(2024, 1, 1, 23, 45)));
    assert_eq!(report.tombstoned, 0);
    assert_eq!(report.unconfirmed, 96);
    assert!(store.snapshot().await.iter().all(|p| !p.is_tombstone()));

    // provider is healthy again
    let (second, report) = eng.fill_with_report(day1, end).await.unwrap();
    assert_eq!(report.cached, 96);
    assert_eq!(report.fetched, 96);
    assert_eq!(ctl.calls().await.last(), Some(&(day2, end)));
    assert_eq!(timestamps(&second), TimeGrid::quarter_hourly().expected(day1, end));
    assert!(second.iter().all(|p| p.price.is_some()));
    assert_eq!(store.snapshot().await, second);
}

#[tokio::test]
async fn empty_answer_after_a_failure_confirms_the_gap() {
    let day1 = dt(2024, 1, 1, 0, 0);
    let day2 = dt(2024, 1, 2, 0, 0);
    let end = dt(2024, 1, 2, 23, 45);
    let store = Arc::new(MemoryPriceStore::new());

    let (primary, primary_ctl) = MockProvider::serving("primary", 0, hourly(day1, 48, 1.0)).await;
    primary_ctl
        .push_once(MockBehavior::Serve(hourly(day1, 48, 1.0)))
        .await;
    primary_ctl
        .push_once(MockBehavior::Fail(ProviderError::api("primary", "connection reset")))
        .await;
    // answers without data
    let (backup, _) = MockProvider::new_with_controller("backup", 1);

    let m = ProviderManager::builder()
        .with_provider(primary)
        .with_provider(backup)
        .chunk_span(Duration::from_secs(86_400))
        .build()
        .unwrap();
    let eng = engine(store.clone(), m);

    let (got, report) = eng.fill_with_report(day1, end).await.unwrap();
    assert_eq!(report.tombstoned, 96);
    assert_eq!(report.unconfirmed, 0);
    assert!(got.iter().filter(|p| p.timestamp >= day2).all(PricePoint::is_tombstone));
    assert_eq!(store.snapshot().await.len(), 192);
}
