//! Middleware trait for wrapping `PriceProvider` implementations.

use std::sync::Arc;

use crate::provider::PriceProvider;

/// Trait implemented by provider middleware layers.
///
/// A middleware consumes an inner `PriceProvider` and returns a wrapped provider
/// that augments or restricts behavior (e.g., quotas, retries). Wrappers keep
/// the inner provider's name, priority and availability.
pub trait Middleware: Send + Sync {
    /// Apply this middleware to wrap an inner provider and return the wrapped provider.
    fn apply(self: Box<Self>, inner: Arc<dyn PriceProvider>) -> Arc<dyn PriceProvider>;

    /// Human-readable middleware name for introspection/logging.
    fn name(&self) -> &'static str;

    /// Opaque configuration snapshot for serialization/inspection.
    fn config_json(&self) -> serde_json::Value;
}
