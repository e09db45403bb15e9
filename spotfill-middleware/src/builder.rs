//! Builder for composing providers with middleware layers.
//!
//! Layers form an onion around the raw provider. They are stored outermost
//! first and applied in reverse during `build()`:
//!
//! ```text
//! builder.with_retry(..).with_quota(..)
//!
//! Storage: [Quota, Retry]  (outermost first)
//! Applied:  Raw -> Retry -> Quota
//! Result:   Quota(Retry(Raw))
//! ```
//!
//! With that ordering every retry attempt is an internal detail of one quota
//! unit; add the quota first and the retry last to charge each attempt instead.

use std::sync::Arc;

use spotfill_core::{Middleware, PriceProvider, QuotaConfig, RetryConfig};

use crate::quota::QuotaMiddleware;
use crate::retry::RetryMiddleware;

/// Generic middleware builder for composing a provider with layered wrappers.
pub struct ProviderBuilder {
    raw: Arc<dyn PriceProvider>,
    /// Middleware layers in outermost-first order.
    layers: Vec<Box<dyn Middleware>>,
}

impl ProviderBuilder {
    /// Create a new builder from a raw, unwrapped provider.
    #[must_use]
    pub fn new(raw: Arc<dyn PriceProvider>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    /// Add or replace the quota layer as the new outermost layer.
    #[must_use]
    pub fn with_quota(mut self, cfg: &QuotaConfig) -> Self {
        self.layers.retain(|m| m.name() != "QuotaAwareProvider");
        self.layers
            .insert(0, Box::new(QuotaMiddleware::new(cfg.clone())));
        self
    }

    /// Add or replace the retry layer as the new outermost layer.
    #[must_use]
    pub fn with_retry(mut self, cfg: &RetryConfig) -> Self {
        self.layers.retain(|m| m.name() != "RetryingProvider");
        self.layers
            .insert(0, Box::new(RetryMiddleware::new(cfg.clone())));
        self
    }

    /// Add an arbitrary middleware as the new outermost layer.
    #[must_use]
    pub fn layer(mut self, m: Box<dyn Middleware>) -> Self {
        self.layers.insert(0, m);
        self
    }

    /// Layer names, outermost first.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    /// Configuration snapshot of every layer, outermost first.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.layers
                .iter()
                .map(|m| serde_json::json!({ "name": m.name(), "config": m.config_json() }))
                .collect(),
        )
    }

    /// Build the wrapped provider.
    #[must_use]
    pub fn build(self) -> Arc<dyn PriceProvider> {
        let mut wrapped = self.raw;
        for m in self.layers.into_iter().rev() {
            wrapped = m.apply(wrapped);
        }
        wrapped
    }
}
