//! spotfill-entsoe
//!
//! `PriceProvider` for the ENTSO-E transparency platform (day-ahead prices,
//! document type A44). Requires a security token; without one the provider
//! reports itself unavailable and is left out of rotation.
#![warn(missing_docs)]

mod document;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use reqwest::StatusCode;

use spotfill_core::{PriceConversion, PricePoint, PriceProvider, ProviderError, ProviderKey, dedup_sorted};

use crate::document::Parsed;

/// Public transparency platform host.
pub const DEFAULT_BASE_URL: &str = "https://web-api.tp.entsoe.eu";

/// Bidding zone code for Finland.
pub const FINLAND_DOMAIN: &str = "10YFI-1--------U";

/// Environment variable holding the security token.
pub const TOKEN_ENV: &str = "ENTSOE_API_KEY";

const NAME: &str = "entsoe";

/// ENTSO-E transparency platform provider.
pub struct EntsoeProvider {
    client: reqwest::Client,
    base_url: String,
    domain: String,
    security_token: Option<String>,
    priority: i32,
    conversion: PriceConversion,
}

/// Builder for [`EntsoeProvider`].
pub struct EntsoeBuilder {
    client: Option<reqwest::Client>,
    base_url: String,
    domain: String,
    security_token: Option<String>,
    priority: i32,
    conversion: PriceConversion,
    timeout: Duration,
}

impl Default for EntsoeBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            domain: FINLAND_DOMAIN.to_string(),
            security_token: None,
            priority: 10,
            conversion: PriceConversion::default(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl EntsoeBuilder {
    /// Override the platform host (tests point this at a local mock server).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bidding zone used for both `in_Domain` and `out_Domain`.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Security token. Blank tokens count as absent.
    #[must_use]
    pub fn security_token(mut self, token: Option<String>) -> Self {
        self.security_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Take the security token from `ENTSOE_API_KEY`.
    #[must_use]
    pub fn token_from_env(self) -> Self {
        let token = std::env::var(TOKEN_ENV).ok();
        self.security_token(token)
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
    pub fn build(self) -> Result<EntsoeProvider, ProviderError> {
        let client = match self.client {
            Some(c) => c,
            None => reqwest::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| ProviderError::api(NAME, format!("http client: {e}")))?,
        };
        Ok(EntsoeProvider {
            client,
            base_url: self.base_url,
            domain: self.domain,
            security_token: self.security_token,
            priority: self.priority,
            conversion: self.conversion,
        })
    }
}

/// `YYYYMMDDHHMM` in UTC, the platform's query timestamp format.
fn period_param(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d%H%M").to_string()
}

impl EntsoeProvider {
    /// Static provider key for priority configuration.
    pub const KEY: ProviderKey = ProviderKey::new(NAME);

    /// Start building a provider.
    #[must_use]
    pub fn builder() -> EntsoeBuilder {
        EntsoeBuilder::default()
    }

    /// Finnish bidding zone against the public platform, token from `ENTSOE_API_KEY`.
    ///
    /// # Errors
    /// Returns `ProviderError::Api` when the HTTP client cannot be constructed.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::builder().token_from_env().build()
    }

    /// Query window for an inclusive slot range.
    ///
    /// The start is floored to the hour and the end extended by one hour so
    /// the last requested slot is inside the document.
    fn query_window(start: DateTime<Utc>, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let hour = TimeDelta::hours(1);
        let from = start.duration_trunc(hour).unwrap_or(start);
        let to = end.duration_trunc(hour).unwrap_or(end) + hour;
        (from, to)
    }

    fn transport_err(e: &reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::api(NAME, format!("request timed out: {e}"))
        } else {
            ProviderError::api(NAME, format!("request failed: {e}"))
        }
    }

    fn status_err(status: StatusCode, body: &str) -> ProviderError {
        match status {
            StatusCode::UNAUTHORIZED => {
                ProviderError::status(NAME, status.as_u16(), "invalid security token")
            }
            StatusCode::BAD_REQUEST => {
                ProviderError::status(NAME, status.as_u16(), format!("malformed request: {body}"))
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::status(
                NAME,
                status.as_u16(),
                "rate limited by the transparency platform",
            ),
            other => ProviderError::status(
                NAME,
                other.as_u16(),
                format!("unexpected status {other}: {body}"),
            ),
        }
    }
}

#[async_trait]
impl PriceProvider for EntsoeProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_available(&self) -> bool {
        self.security_token.is_some()
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "spotfill::entsoe::fetch", skip(self), fields(start = %start, end = %end))
    )]
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let Some(token) = self.security_token.as_deref() else {
            return Err(ProviderError::api(NAME, "no security token configured"));
        };
        if start > end {
            return Ok(Vec::new());
        }

        let (from, to) = Self::query_window(start, end);
        let period_start = period_param(from);
        let period_end = period_param(to);
        let url = format!("{}/api", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("documentType", "A44"),
                ("in_Domain", self.domain.as_str()),
                ("out_Domain", self.domain.as_str()),
                ("periodStart", period_start.as_str()),
                ("periodEnd", period_end.as_str()),
                ("securityToken", token),
            ])
            .send()
            .await
            .map_err(|e| Self::transport_err(&e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Self::transport_err(&e))?;
        if !status.is_success() {
            return Err(Self::status_err(status, &body));
        }

        match document::parse_body(&body, &self.conversion)
            .map_err(|msg| ProviderError::data(NAME, msg))?
        {
            Parsed::NoData(_reason) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(reason = %_reason, "platform has no data for window");
                Ok(Vec::new())
            }
            Parsed::Points(mut points) => {
                points.retain(|p| p.timestamp >= start && p.timestamp <= end);
                Ok(dedup_sorted(points))
            }
        }
    }
}
