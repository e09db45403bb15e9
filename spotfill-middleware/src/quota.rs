//! Quota-aware provider wrapper.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use spotfill_core::{Middleware, PricePoint, PriceProvider, ProviderError, QuotaConfig};

/// Wrapper that enforces a local request budget per fixed window.
///
/// A rejected call never reaches the inner provider and surfaces as a 429-style
/// `ProviderError::Api`, so the manager treats it like any other failed attempt.
pub struct QuotaAwareProvider {
    inner: Arc<dyn PriceProvider>,
    config: QuotaConfig,
    runtime: Mutex<QuotaRuntime>,
}

struct QuotaRuntime {
    calls_made_in_window: u64,
    window_start: Instant,
}

impl QuotaAwareProvider {
    /// Create a new quota-aware wrapper around an existing provider.
    pub fn new(inner: Arc<dyn PriceProvider>, config: QuotaConfig) -> Self {
        Self {
            inner,
            config,
            runtime: Mutex::new(QuotaRuntime {
                calls_made_in_window: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Access the inner provider.
    pub fn inner(&self) -> &Arc<dyn PriceProvider> {
        &self.inner
    }

    /// Calls still allowed in the current window.
    pub fn remaining(&self) -> u64 {
        let rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        self.config.limit.saturating_sub(rt.calls_made_in_window)
    }

    /// Consume one unit of budget or report how long until the window resets.
    ///
    /// # Errors
    /// Returns a 429-style `ProviderError::Api` when the budget is spent.
    pub fn should_allow_call(&self) -> Result<(), ProviderError> {
        let mut rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let window = self.config.window.max(Duration::from_millis(1));

        // Align the window start to a whole number of windows so gaps in
        // usage do not shift the boundaries.
        let elapsed = now.duration_since(rt.window_start);
        if elapsed >= window {
            let windows_passed = elapsed.as_nanos() / window.as_nanos();
            let offset = Duration::from_nanos(
                (windows_passed * window.as_nanos())
                    .try_into()
                    .unwrap_or(u64::MAX),
            );
            rt.window_start += offset;
            rt.calls_made_in_window = 0;
        }

        if rt.calls_made_in_window < self.config.limit {
            rt.calls_made_in_window += 1;
            return Ok(());
        }

        let reset_in_ms = window
            .saturating_sub(now.duration_since(rt.window_start))
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX);
        drop(rt);
        Err(ProviderError::rate_limited(self.inner.name(), reset_in_ms))
    }
}

#[async_trait]
impl PriceProvider for QuotaAwareProvider {
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
        if let Err(e) = self.should_allow_call() {
            #[cfg(feature = "tracing")]
            tracing::warn!(provider = self.inner.name(), error = %e, "local quota exhausted");
            return Err(e);
        }
        self.inner.fetch(start, end).await
    }
}

/// Middleware config for constructing a [`QuotaAwareProvider`].
pub struct QuotaMiddleware {
    /// Budget applied to the wrapped provider.
    pub config: QuotaConfig,
}

impl QuotaMiddleware {
    /// Middleware enforcing `config`.
    #[must_use]
    pub const fn new(config: QuotaConfig) -> Self {
        Self { config }
    }
}

impl Middleware for QuotaMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn PriceProvider>) -> Arc<dyn PriceProvider> {
        Arc::new(QuotaAwareProvider::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "QuotaAwareProvider"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "limit": self.config.limit,
            "window_ms": self.config.window.as_millis(),
        })
    }
}
