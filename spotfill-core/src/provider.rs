use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{PricePoint, ProviderError, ProviderKey};

/// An upstream source of price points.
///
/// Implementations return points at their own native granularity, which may be
/// coarser than the cache grid. The fill engine expands coarse output to the
/// grid; providers never need to know the grid step.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Stable, human-readable provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Typed key for priority overrides.
    fn key(&self) -> ProviderKey {
        ProviderKey::new(self.name())
    }

    /// Rotation priority; lower values are tried first.
    fn priority(&self) -> i32;

    /// Whether the provider is usable with the current configuration.
    ///
    /// Unavailable providers are excluded from rotation entirely.
    fn is_available(&self) -> bool {
        true
    }

    /// Fetch points whose slot start lies in `[start, end]`, sorted ascending.
    ///
    /// An empty vector means "the upstream has nothing for this range" and is
    /// not an error.
    ///
    /// # Errors
    /// `ProviderError::Api` for transport, status, timeout and rate-limit
    /// failures; `ProviderError::Data` when the payload cannot be interpreted.
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ProviderError>;
}
