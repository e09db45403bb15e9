use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use spotfill_core::{
    AttemptStatus, ChunkAttempt, FetchReport, ManagerConfig, PricePoint, PriceProvider,
    ProviderError, ProviderKey, TimeGrid, ValidationError, chunk_range, dedup_sorted,
};

/// What one provider produced for one chunk.
#[derive(Debug)]
pub(crate) enum ChunkOutcome {
    Filled(Vec<PricePoint>),
    Empty,
    Failed(ProviderError),
}

impl ChunkOutcome {
    fn from_result(res: Result<Vec<PricePoint>, ProviderError>) -> Self {
        match res {
            Ok(points) if points.is_empty() => Self::Empty,
            Ok(points) => Self::Filled(points),
            Err(e) => Self::Failed(e),
        }
    }

    fn status(&self) -> AttemptStatus {
        match self {
            Self::Filled(points) => AttemptStatus::Filled {
                points: points.len(),
            },
            Self::Empty => AttemptStatus::Empty,
            Self::Failed(e) => AttemptStatus::Failed(e.clone()),
        }
    }
}

/// Fetches a range from prioritized providers, falling back chunk by chunk.
///
/// The range is split into chunks of at most `chunk_span`. Providers are tried
/// in ascending priority; each one is asked only for chunks that earlier
/// providers left unresolved. At most `max_providers_tried` providers are used
/// per fetch. Whatever was collected is returned, even when some chunks stay
/// unresolved; an error is produced only when nothing at all came back.
pub struct ProviderManager {
    providers: Vec<Arc<dyn PriceProvider>>,
    cfg: ManagerConfig,
    grid: TimeGrid,
}

/// Builder for [`ProviderManager`].
pub struct ProviderManagerBuilder {
    providers: Vec<Arc<dyn PriceProvider>>,
    cfg: ManagerConfig,
    grid: TimeGrid,
}

impl Default for ProviderManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderManagerBuilder {
    /// Create a builder with default configuration and no providers.
    ///
    /// Defaults: 30-day chunks, two providers per fetch, a 90s per-call
    /// timeout and a 15-minute grid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: vec![],
            cfg: ManagerConfig::default(),
            grid: TimeGrid::default(),
        }
    }

    /// Register a provider.
    ///
    /// Registration order breaks ties between equal priorities. Providers that
    /// report themselves unavailable are dropped at build time.
    #[must_use]
    pub fn with_provider(mut self, p: Arc<dyn PriceProvider>) -> Self {
        self.providers.push(p);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: ManagerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Maximum span of a single provider request.
    #[must_use]
    pub const fn chunk_span(mut self, span: Duration) -> Self {
        self.cfg.chunk_span = span;
        self
    }

    /// How many providers a single fetch may fall through.
    #[must_use]
    pub const fn max_providers_tried(mut self, n: usize) -> Self {
        self.cfg.max_providers_tried = n;
        self
    }

    /// Upper bound on every individual provider call.
    #[must_use]
    pub const fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.provider_timeout = timeout;
        self
    }

    /// Override the priority a provider reports for itself.
    #[must_use]
    pub fn priority_override(mut self, key: ProviderKey, priority: i32) -> Self {
        self.cfg
            .priority_overrides
            .insert(key.as_str().to_string(), priority);
        self
    }

    /// Grid the chunk boundaries are laid on (quarter-hourly by default).
    ///
    /// Must match the grid of the engine the manager is handed to;
    /// `CacheFillEngineBuilder::build` rejects a mismatch.
    #[must_use]
    pub const fn grid(mut self, grid: TimeGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Grid step as a plain duration.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidStep` for a step that does not divide a day.
    pub fn grid_step(mut self, step: Duration) -> Result<Self, ValidationError> {
        self.grid = TimeGrid::new(step)?;
        Ok(self)
    }

    /// Build the manager.
    ///
    /// # Errors
    /// `NoProviders` when nothing was registered; `InvalidConfig` for a zero
    /// chunk span, a zero provider budget or a zero timeout.
    pub fn build(self) -> Result<ProviderManager, ValidationError> {
        if self.providers.is_empty() {
            return Err(ValidationError::NoProviders);
        }
        if self.cfg.chunk_span.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "chunk_span must be positive".to_string(),
            ));
        }
        if self.cfg.max_providers_tried == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_providers_tried must be at least 1".to_string(),
            ));
        }
        if self.cfg.provider_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "provider_timeout must be positive".to_string(),
            ));
        }

        let effective = |p: &Arc<dyn PriceProvider>| {
            self.cfg
                .priority_overrides
                .get(p.name())
                .copied()
                .unwrap_or_else(|| p.priority())
        };

        let mut ranked: Vec<(i32, usize, Arc<dyn PriceProvider>)> = Vec::new();
        for (idx, p) in self.providers.iter().enumerate() {
            if !p.is_available() {
                #[cfg(feature = "tracing")]
                tracing::warn!(provider = p.name(), "provider unavailable; leaving it out of rotation");
                continue;
            }
            ranked.push((effective(p), idx, Arc::clone(p)));
        }
        ranked.sort_by_key(|(prio, idx, _)| (*prio, *idx));

        Ok(ProviderManager {
            providers: ranked.into_iter().map(|(_, _, p)| p).collect(),
            cfg: self.cfg,
            grid: self.grid,
        })
    }
}

impl ProviderManager {
    /// Start building a manager.
    #[must_use]
    pub fn builder() -> ProviderManagerBuilder {
        ProviderManagerBuilder::new()
    }

    /// Available providers in the order they are tried.
    #[must_use]
    pub fn available_providers(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Number of available providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.cfg
    }

    /// Grid the chunk boundaries are laid on.
    #[must_use]
    pub const fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Wrap a provider future with a timeout and standardized timeout error mapping.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "spotfill::manager::provider_call_with_timeout",
            skip(fut),
            fields(
                provider = provider_name,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ),
        )
    )]
    pub(crate) async fn provider_call_with_timeout<T, Fut>(
        provider_name: &'static str,
        timeout: Duration,
        fut: Fut,
    ) -> Result<T, ProviderError>
    where
        Fut: core::future::Future<Output = Result<T, ProviderError>>,
    {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        (tokio::time::timeout(timeout, fut).await)
            .unwrap_or_else(|_| Err(ProviderError::timeout(provider_name, timeout_ms)))
    }

    async fn fetch_chunk(
        &self,
        provider: &Arc<dyn PriceProvider>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ChunkOutcome {
        let res = Self::provider_call_with_timeout(
            provider.name(),
            self.cfg.provider_timeout,
            provider.fetch(start, end),
        )
        .await;
        ChunkOutcome::from_result(res)
    }

    /// Fetch `[start, end]` (inclusive slot starts) from the provider rotation.
    ///
    /// # Errors
    /// `NoProviders` when no provider is available; `Exhausted` carrying the
    /// last underlying failure when no provider returned a single point.
    pub async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        self.fetch_with_report(start, end).await.0
    }

    /// Like [`fetch`](Self::fetch), also returning every attempt made.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "spotfill::manager::fetch",
            skip(self),
            fields(start = %start, end = %end, providers = self.providers.len()),
        )
    )]
    pub async fn fetch_with_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (Result<Vec<PricePoint>, ProviderError>, FetchReport) {
        let mut report = FetchReport::default();
        if self.providers.is_empty() {
            return (Err(ProviderError::NoProviders), report);
        }
        if start > end {
            return (Ok(Vec::new()), report);
        }

        let span = TimeDelta::from_std(self.cfg.chunk_span).unwrap_or(TimeDelta::MAX);
        let mut unresolved = chunk_range(start, end, span, self.grid.step());
        let mut collected: Vec<PricePoint> = Vec::new();

        for provider in self.providers.iter().take(self.cfg.max_providers_tried) {
            if unresolved.is_empty() {
                break;
            }
            report.providers_tried += 1;

            let mut still_open = Vec::new();
            for (chunk_start, chunk_end) in unresolved {
                let outcome = self.fetch_chunk(provider, chunk_start, chunk_end).await;
                report.attempts.push(ChunkAttempt {
                    provider: provider.name().to_string(),
                    start: chunk_start,
                    end: chunk_end,
                    status: outcome.status(),
                });
                match outcome {
                    ChunkOutcome::Filled(points) => collected.extend(points),
                    ChunkOutcome::Empty => still_open.push((chunk_start, chunk_end)),
                    ChunkOutcome::Failed(_e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            provider = provider.name(),
                            chunk_start = %chunk_start,
                            chunk_end = %chunk_end,
                            error = %_e,
                            "chunk fetch failed"
                        );
                        still_open.push((chunk_start, chunk_end));
                    }
                }
            }
            unresolved = still_open;
        }
        report.unresolved = unresolved;

        if collected.is_empty() {
            let err = ProviderError::Exhausted {
                tried: report.providers_tried,
                last: report.last_error().cloned().map(Box::new),
            };
            return (Err(err), report);
        }

        #[cfg(feature = "tracing")]
        if !report.unresolved.is_empty() {
            tracing::warn!(
                unresolved = report.unresolved.len(),
                "returning partial result; some chunks had no data"
            );
        }
        (Ok(dedup_sorted(collected)), report)
    }
}
