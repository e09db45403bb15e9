use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use spotfill_core::{
    Clock, FillConfig, FillError, FillReport, Horizon, PricePoint, PriceStore, SystemClock,
    TimeGrid, ValidationError, expand_to_grid, merge_by_priority,
};

use crate::manager::ProviderManager;

/// Gap-filling write-through cache over a [`PriceStore`].
///
/// One `fill` reads what the store already has, works out which grid slots are
/// missing and eligible under the publication horizon, asks the
/// [`ProviderManager`] for that span and persists what came back.
/// Slots a provider answered for but had no value for are stored as
/// tombstones so they are not asked for again; slots whose chunk failed on
/// every provider stay open for a later fill. Stored rows are never
/// overwritten.
pub struct CacheFillEngine {
    store: Arc<dyn PriceStore>,
    manager: Arc<ProviderManager>,
    clock: Arc<dyn Clock>,
    grid: TimeGrid,
    cfg: FillConfig,
}

/// Builder for [`CacheFillEngine`].
pub struct CacheFillEngineBuilder {
    store: Option<Arc<dyn PriceStore>>,
    manager: Option<Arc<ProviderManager>>,
    clock: Arc<dyn Clock>,
    cfg: FillConfig,
}

impl Default for CacheFillEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheFillEngineBuilder {
    /// Builder with the system clock and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            manager: None,
            clock: Arc::new(SystemClock),
            cfg: FillConfig::default(),
        }
    }

    /// Backing store (required).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn PriceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Provider manager (required).
    #[must_use]
    pub fn manager(mut self, manager: Arc<ProviderManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Source of "now" for horizon evaluation.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: FillConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// `InvalidConfig` when the store or manager is missing or the manager
    /// chunks on a different grid; `InvalidStep` when the configured grid
    /// step does not divide a day.
    pub fn build(self) -> Result<CacheFillEngine, ValidationError> {
        let store = self
            .store
            .ok_or_else(|| ValidationError::InvalidConfig("a store is required".to_string()))?;
        let manager = self.manager.ok_or_else(|| {
            ValidationError::InvalidConfig("a provider manager is required".to_string())
        })?;
        let grid = TimeGrid::new(self.cfg.grid_step)?;
        if manager.grid().step() != grid.step() {
            return Err(ValidationError::InvalidConfig(format!(
                "manager grid step {}s differs from fill grid step {}s",
                manager.grid().step_secs(),
                grid.step_secs()
            )));
        }
        if self.cfg.coarse_step.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "coarse_step must be positive".to_string(),
            ));
        }
        Ok(CacheFillEngine {
            store,
            manager,
            clock: self.clock,
            grid,
            cfg: self.cfg,
        })
    }
}

impl CacheFillEngine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> CacheFillEngineBuilder {
        CacheFillEngineBuilder::new()
    }

    /// Grid the engine fills.
    #[must_use]
    pub const fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Start of the provider request for a gap beginning at `first`.
    ///
    /// Coarse providers publish one point at the start of each coarse
    /// interval, so a gap starting mid-interval is requested from the
    /// interval start; otherwise the covering point would be filtered out.
    fn request_start(&self, first: DateTime<Utc>) -> DateTime<Utc> {
        let coarse = i64::try_from(self.cfg.coarse_step.as_secs()).unwrap_or(0);
        let step = self.grid.step_secs();
        if coarse > step && coarse % step == 0 {
            first - TimeDelta::seconds(first.timestamp().rem_euclid(coarse))
        } else {
            first
        }
    }

    /// Return the series for `[start, end]`, fetching and persisting missing slots.
    ///
    /// The result is sorted ascending with one point per timestamp and may
    /// contain tombstones. Slots beyond the horizon, or in chunks every
    /// provider failed on, are simply absent.
    ///
    /// # Errors
    /// `Validation` for an inverted (or, in strict mode, unaligned) range;
    /// `Storage` when the store fails; `Provider` when every provider failed
    /// and the store had nothing for the range.
    pub async fn fill(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, FillError> {
        self.fill_with_report(start, end).await.map(|(points, _)| points)
    }

    /// Like [`fill`](Self::fill), also returning what the fill did.
    ///
    /// # Errors
    /// See [`fill`](Self::fill).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "spotfill::engine::fill",
            skip(self),
            fields(start = %start, end = %end, step_secs = self.grid.step_secs()),
        )
    )]
    pub async fn fill_with_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<PricePoint>, FillReport), FillError> {
        self.grid.validate(start, end, self.cfg.require_aligned)?;

        let mut report = FillReport::default();
        let from = self.grid.floor(start);
        let to = self.grid.floor(end);
        let cached = self.store.read_range(from, to).await?;
        report.cached = cached.len();

        let expected = self.grid.expected(start, end);
        let missing = TimeGrid::missing(&expected, cached.iter().map(|p| p.timestamp));
        if missing.is_empty() {
            return Ok((merge_by_priority([cached]), report));
        }

        let horizon = Horizon::at(&self.cfg.horizon, self.clock.now());
        let (eligible, deferred): (BTreeSet<_>, BTreeSet<_>) =
            missing.into_iter().partition(|t| horizon.admits(*t));
        report.deferred = deferred.len();
        let (Some(&first), Some(&last)) = (eligible.first(), eligible.last()) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(deferred = report.deferred, "all missing slots are beyond the horizon");
            return Ok((merge_by_priority([cached]), report));
        };

        let (result, fetch_report) = self
            .manager
            .fetch_with_report(self.request_start(first), last)
            .await;
        let fetched = match result {
            Ok(points) => points,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, cached = cached.len(), "provider fetch failed; serving cached rows");
                if cached.is_empty() && self.cfg.propagate_when_empty {
                    return Err(e.into());
                }
                report.degraded = Some(e);
                return Ok((merge_by_priority([cached]), report));
            }
        };

        let coarse = TimeDelta::from_std(self.cfg.coarse_step).unwrap_or(TimeDelta::MAX);
        let normalized = expand_to_grid(fetched, &self.grid, coarse);
        let fresh: Vec<PricePoint> = merge_by_priority([normalized])
            .into_iter()
            .filter(|p| eligible.contains(&p.timestamp))
            .collect();
        if !fresh.is_empty() {
            self.store.upsert_many(&fresh).await?;
        }
        report.fetched = fresh.len();

        let covered: BTreeSet<DateTime<Utc>> = fresh.iter().map(|p| p.timestamp).collect();
        let outages = fetch_report.failed_chunks();
        let step = self.grid.step();
        let (unconfirmed, confirmed): (BTreeSet<_>, BTreeSet<_>) = eligible
            .difference(&covered)
            .copied()
            .partition(|t| outages.iter().any(|&(s, e)| s <= *t && *t < e + step));
        report.unconfirmed = unconfirmed.len();
        #[cfg(feature = "tracing")]
        if !unconfirmed.is_empty() {
            tracing::warn!(count = unconfirmed.len(), "slots left open after provider failures");
        }

        let tombstones: Vec<PricePoint> = confirmed.into_iter().map(PricePoint::tombstone).collect();
        if !tombstones.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::info!(count = tombstones.len(), "recording slots with no data");
            self.store.upsert_many(&tombstones).await?;
        }
        report.tombstoned = tombstones.len();

        Ok((merge_by_priority([cached, fresh, tombstones]), report))
    }
}
