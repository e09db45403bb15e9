//! Transport retry wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;

use spotfill_core::{Middleware, PricePoint, PriceProvider, ProviderError, RetryConfig};

/// Delay before retry number `attempt` (1-based).
///
/// `backoff_factor * 2^(attempt-1)`, capped at `max_backoff`, plus up to
/// `jitter_percent` of that value chosen at random.
#[must_use]
pub fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let base_ms = u64::try_from(cfg.backoff_factor.as_millis()).unwrap_or(u64::MAX);
    let cap_ms = u64::try_from(cfg.max_backoff.as_millis()).unwrap_or(u64::MAX);
    let exp = attempt.saturating_sub(1).min(32);
    let delay_ms = base_ms.saturating_mul(1u64 << exp).min(cap_ms);

    let jitter_range = delay_ms.saturating_mul(u64::from(cfg.jitter_percent.min(100))) / 100;
    let jitter = if jitter_range == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_range)
    };
    Duration::from_millis(delay_ms.saturating_add(jitter))
}

/// Wrapper that retries transient failures of the inner provider.
///
/// Only status-less `Api` errors (connect failures, timeouts) and `Api` errors
/// whose status is listed in `retry_statuses` are retried. Data errors and
/// other statuses are returned immediately.
pub struct RetryingProvider {
    inner: Arc<dyn PriceProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    /// Wrap `inner` with `config`.
    pub fn new(inner: Arc<dyn PriceProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Access the inner provider.
    pub fn inner(&self) -> &Arc<dyn PriceProvider> {
        &self.inner
    }
}

#[async_trait]
impl PriceProvider for RetryingProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.fetch(start, end).await {
                Ok(points) => return Ok(points),
                Err(e)
                    if attempt < self.config.max_retries
                        && e.is_retryable(&self.config.retry_statuses) =>
                {
                    attempt += 1;
                    let delay = backoff_delay(&self.config, attempt);

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "retrying provider call"
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Middleware config for constructing a [`RetryingProvider`].
pub struct RetryMiddleware {
    /// Retry policy applied to the wrapped provider.
    pub config: RetryConfig,
}

impl RetryMiddleware {
    /// Middleware retrying per `config`.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Middleware for RetryMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn PriceProvider>) -> Arc<dyn PriceProvider> {
        Arc::new(RetryingProvider::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "RetryingProvider"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_retries": self.config.max_retries,
            "backoff_factor_ms": self.config.backoff_factor.as_millis(),
            "max_backoff_ms": self.config.max_backoff.as_millis(),
            "retry_statuses": self.config.retry_statuses,
            "jitter_percent": self.config.jitter_percent,
        })
    }
}
