//! Fill the cache for today and tomorrow (Helsinki time) and print the series.
//!
//! Reads `.env`/environment through `Settings`. Set `SPOTFILL_DEMO_USE_MOCK=1`
//! to run against an in-memory store and a scripted provider instead of the
//! live APIs.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use spotfill::{
    CacheFillEngine, PricePoint, PriceProvider, PriceStore, ProviderBuilder,
    QuotaConfig, RetryConfig, Settings, TimeGrid,
};
use spotfill_entsoe::EntsoeProvider;
use spotfill_mock::{MemoryPriceStore, MockProvider};
use spotfill_nordpool::NordpoolProvider;
use spotfill_store::SqlitePriceStore;
use tracing_subscriber::EnvFilter;

async fn live_parts(
    settings: &Settings,
) -> Result<(Arc<dyn PriceStore>, Vec<Arc<dyn PriceProvider>>), Box<dyn std::error::Error>> {
    let store = SqlitePriceStore::connect(&settings.database_url).await?;

    let nordpool: Arc<dyn PriceProvider> = Arc::new(
        NordpoolProvider::builder()
            .conversion(settings.conversion)
            .build()?,
    );
    let entsoe: Arc<dyn PriceProvider> = Arc::new(
        EntsoeProvider::builder()
            .security_token(settings.entsoe_api_key.clone())
            .conversion(settings.conversion)
            .build()?,
    );

    let layered = [nordpool, entsoe]
        .into_iter()
        .map(|raw| {
            ProviderBuilder::new(raw)
                .with_retry(&RetryConfig::default())
                .with_quota(&QuotaConfig::default())
                .build()
        })
        .collect();
    Ok((Arc::new(store), layered))
}

async fn mock_parts() -> (Arc<dyn PriceStore>, Vec<Arc<dyn PriceProvider>>) {
    println!("--- (Using mock store and provider) ---");
    let start = TimeGrid::hourly().floor(Utc::now()) - TimeDelta::days(1);
    let series: Vec<PricePoint> = (0..72u32)
        .map(|h| PricePoint::priced(start + TimeDelta::hours(i64::from(h)), 5.0 + f64::from(h % 24)))
        .collect();
    let (p, _) = MockProvider::serving("mock", 0, series).await;
    (Arc::new(MemoryPriceStore::new()), vec![p])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("spotfill=info".parse()?))
        .with_target(true)
        .init();

    let settings = Settings::from_env()?;
    let (store, providers) = if std::env::var("SPOTFILL_DEMO_USE_MOCK").is_ok() {
        mock_parts().await
    } else {
        live_parts(&settings).await?
    };

    let mut builder = settings.manager_builder()?;
    for p in providers {
        builder = builder.with_provider(p);
    }
    let manager = builder.build()?;
    println!("providers in rotation: {:?}", manager.available_providers());

    let engine = CacheFillEngine::builder()
        .store(store)
        .manager(Arc::new(manager))
        .config(settings.fill.clone())
        .build()?;

    let tz = chrono_tz::Europe::Helsinki;
    let today = Utc::now().with_timezone(&tz).date_naive();
    let (Some(from), Some(to)) = (
        today.and_hms_opt(0, 0, 0).and_then(|t| t.and_local_timezone(tz).earliest()),
        today
            .succ_opt()
            .and_then(|d| d.and_hms_opt(23, 45, 0))
            .and_then(|t| t.and_local_timezone(tz).earliest()),
    ) else {
        return Err("could not resolve local day bounds".into());
    };

    let (series, report) = engine
        .fill_with_report(from.with_timezone(&Utc), to.with_timezone(&Utc))
        .await?;
    println!("{report:?}");
    for p in &series {
        match p.price {
            Some(c) => println!("{}  {c:>7.2} c/kWh", p.timestamp.with_timezone(&tz)),
            None => println!("{}  (no data)", p.timestamp.with_timezone(&tz)),
        }
    }
    Ok(())
}
