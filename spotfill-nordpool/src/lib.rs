//! spotfill-nordpool
//!
//! `PriceProvider` for the Nord Pool day-ahead data portal.
//!
//! The portal serves one delivery day per request, keyed by the market's civil
//! date (Stockholm time). A range is fetched as one request per civil day, all
//! issued concurrently and merged. The provider needs no credentials and is
//! always available.
#![warn(missing_docs)]

mod wire;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::future::try_join_all;
use reqwest::StatusCode;

use spotfill_core::{PriceConversion, PricePoint, PriceProvider, ProviderError, ProviderKey, dedup_sorted};

/// Public Nord Pool data portal host.
pub const DEFAULT_BASE_URL: &str = "https://dataportal-api.nordpoolgroup.com";

const NAME: &str = "nordpool";

/// Nord Pool day-ahead provider.
pub struct NordpoolProvider {
    client: reqwest::Client,
    base_url: String,
    delivery_area: String,
    currency: String,
    market_tz: Tz,
    priority: i32,
    conversion: PriceConversion,
}

/// Builder for [`NordpoolProvider`].
pub struct NordpoolBuilder {
    client: Option<reqwest::Client>,
    base_url: String,
    delivery_area: String,
    currency: String,
    market_tz: Tz,
    priority: i32,
    conversion: PriceConversion,
    timeout: Duration,
}

impl Default for NordpoolBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            delivery_area: "FI".to_string(),
            currency: "EUR".to_string(),
            market_tz: chrono_tz::Europe::Stockholm,
            priority: 0,
            conversion: PriceConversion::default(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl NordpoolBuilder {
    /// Override the portal host (tests point this at a local mock server).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Delivery area code, e.g. `FI` or `SE3`.
    #[must_use]
    pub fn delivery_area(mut self, area: impl Into<String>) -> Self {
        self.delivery_area = area.into();
        self
    }

    /// Currency requested from the portal.
    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Civil timezone the portal keys delivery days by.
    #[must_use]
    pub const fn market_timezone(mut self, tz: Tz) -> Self {
        self.market_tz = tz;
        self
    }

    /// Rotation priority; lower runs first.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Unit conversion applied to every raw price.
    #[must_use]
    pub const fn conversion(mut self, conversion: PriceConversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Total timeout per HTTP request. Ignored when a client is supplied.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the provider.
    ///
    /// # Errors
    /// Returns `ProviderError::Api` when the HTTP client cannot be constructed.
    pub fn build(self) -> Result<NordpoolProvider, ProviderError> {
        let client = match self.client {
            Some(c) => c,
            None => reqwest::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| ProviderError::api(NAME, format!("http client: {e}")))?,
        };
        Ok(NordpoolProvider {
            client,
            base_url: self.base_url,
            delivery_area: self.delivery_area,
            currency: self.currency,
            market_tz: self.market_tz,
            priority: self.priority,
            conversion: self.conversion,
        })
    }
}

impl NordpoolProvider {
    /// Static provider key for priority configuration.
    pub const KEY: ProviderKey = ProviderKey::new(NAME);

    /// Start building a provider.
    #[must_use]
    pub fn builder() -> NordpoolBuilder {
        NordpoolBuilder::default()
    }

    /// Provider for the Finnish area against the public portal.
    ///
    /// # Errors
    /// Returns `ProviderError::Api` when the HTTP client cannot be constructed.
    pub fn new_default() -> Result<Self, ProviderError> {
        Self::builder().build()
    }

    /// Civil delivery days covering `[start, end]` in the market timezone.
    fn delivery_days(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
        let first = start.with_timezone(&self.market_tz).date_naive();
        let last = end.with_timezone(&self.market_tz).date_naive();
        first.iter_days().take_while(|d| *d <= last).collect()
    }

    fn transport_err(e: &reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::api(NAME, format!("request timed out: {e}"))
        } else {
            ProviderError::api(NAME, format!("request failed: {e}"))
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "spotfill::nordpool::fetch_day", skip(self), fields(area = %self.delivery_area))
    )]
    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<PricePoint>, ProviderError> {
        let url = format!("{}/api/DayAheadPrices", self.base_url);
        let date = day.format("%Y-%m-%d").to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("market", "DayAhead"),
                ("currency", self.currency.as_str()),
                ("deliveryArea", self.delivery_area.as_str()),
                ("date", date.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Self::transport_err(&e))?;

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            #[cfg(feature = "tracing")]
            tracing::debug!(%date, "no data published for day");
            return Ok(Vec::new());
        }
        let body = resp.text().await.map_err(|e| Self::transport_err(&e))?;
        if status != StatusCode::OK {
            return Err(ProviderError::status(
                NAME,
                status.as_u16(),
                format!("unexpected status {status}: {body}"),
            ));
        }

        wire::parse_day(&body, &self.delivery_area, self.market_tz, &self.conversion)
            .map_err(|msg| ProviderError::data(NAME, msg))
    }
}

#[async_trait]
impl PriceProvider for NordpoolProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "spotfill::nordpool::fetch", skip(self), fields(start = %start, end = %end))
    )]
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let days = self.delivery_days(start, end);
        if days.is_empty() {
            return Ok(Vec::new());
        }

        // A failed day fails the whole call: a partial answer would read as
        // "no data" for that day downstream.
        let per_day = try_join_all(days.iter().map(|d| self.fetch_day(*d))).await?;
        let mut points: Vec<PricePoint> = per_day.into_iter().flatten().collect();
        points.retain(|p| p.timestamp >= start && p.timestamp <= end);
        Ok(dedup_sorted(points))
    }
}
