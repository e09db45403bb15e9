// Shared fixtures for the spotfill integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use spotfill::{CacheFillEngine, FillConfig, HorizonPolicy, PricePoint, ProviderManager, PriceStore};
use spotfill_mock::FixedClock;

/// Construct a UTC instant from components for readability in tests.
pub fn dt(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
    let date = chrono::NaiveDate::from_ymd_opt(y, m, d).expect("invalid date");
    let naive = date.and_hms_opt(hh, mm, 0).expect("invalid time components");
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

pub fn priced(t: DateTime<Utc>, price: f64) -> PricePoint {
    PricePoint::priced(t, price)
}

/// `count` points spaced `step` apart starting at `start`; price = index + `base`.
pub fn series(start: DateTime<Utc>, step: TimeDelta, count: usize, base: f64) -> Vec<PricePoint> {
    (0..count)
        .map(|i| {
            let offset = i32::try_from(i).expect("small test series");
            priced(start + step * offset, base + f64::from(offset))
        })
        .collect()
}

/// Hourly series as a day-ahead provider would publish it.
pub fn hourly(start: DateTime<Utc>, hours: usize, base: f64) -> Vec<PricePoint> {
    series(start, TimeDelta::hours(1), hours, base)
}

/// Fill configuration with no horizon, so tests only deal with the grid.
pub fn unbounded() -> FillConfig {
    FillConfig {
        horizon: HorizonPolicy::Unbounded,
        ..FillConfig::default()
    }
}

pub fn engine_with(
    store: Arc<dyn PriceStore>,
    manager: ProviderManager,
    clock: Arc<FixedClock>,
    cfg: FillConfig,
) -> CacheFillEngine {
    CacheFillEngine::builder()
        .store(store)
        .manager(Arc::new(manager))
        .clock(clock)
        .config(cfg)
        .build()
        .expect("valid engine")
}

/// Engine over `store` with an unbounded horizon and a clock fixed at 2030.
pub fn engine(store: Arc<dyn PriceStore>, manager: ProviderManager) -> CacheFillEngine {
    engine_with(
        store,
        manager,
        Arc::new(FixedClock::new(dt(2030, 1, 1, 0, 0))),
        unbounded(),
    )
}

pub fn timestamps(points: &[PricePoint]) -> Vec<DateTime<Utc>> {
    points.iter().map(|p| p.timestamp).collect()
}
