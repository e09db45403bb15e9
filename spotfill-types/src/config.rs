//! Configuration types shared across the engine, the manager and providers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const PUBLISH_CUTOFF: NaiveTime = match NaiveTime::from_hms_opt(14, 0, 0) {
    Some(t) => t,
    None => panic!("invalid publish cutoff"),
};

const NEXT_DAY_UNTIL: NaiveTime = match NaiveTime::from_hms_opt(23, 45, 0) {
    Some(t) => t,
    None => panic!("invalid next-day bound"),
};

/// How far into the future the fill engine is allowed to ask providers for data.
///
/// Slots past the horizon are never fetched and never tombstoned; they are
/// simply left missing until a later call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HorizonPolicy {
    /// Every missing slot is eligible regardless of the current time.
    Unbounded,
    /// Day-ahead publication schedule.
    ///
    /// Before `cutoff` local time only the current local day is eligible. At or
    /// after `cutoff`, the next local day is eligible through `next_day_until`.
    DailyCutoff {
        /// Civil timezone of the market.
        timezone: Tz,
        /// Local time at which next-day prices are published.
        cutoff: NaiveTime,
        /// Last eligible local slot start of the next day.
        next_day_until: NaiveTime,
    },
}

impl Default for HorizonPolicy {
    fn default() -> Self {
        Self::DailyCutoff {
            timezone: chrono_tz::Europe::Helsinki,
            cutoff: PUBLISH_CUTOFF,
            next_day_until: NEXT_DAY_UNTIL,
        }
    }
}

/// Configuration for the cache-fill engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillConfig {
    /// Canonical grid step of the series.
    pub grid_step: Duration,
    /// Granularity of providers that publish coarser than the grid.
    ///
    /// When every fetched point sits on this boundary and the grid is finer,
    /// each point is expanded to cover its whole coarse interval.
    pub coarse_step: Duration,
    /// Eligibility horizon for missing slots.
    pub horizon: HorizonPolicy,
    /// Reject requests whose bounds are not already on the grid instead of flooring them.
    pub require_aligned: bool,
    /// When providers fail and the store had nothing for the range, surface
    /// the provider error instead of returning an empty series.
    pub propagate_when_empty: bool,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            grid_step: Duration::from_secs(15 * 60),
            coarse_step: Duration::from_secs(60 * 60),
            horizon: HorizonPolicy::default(),
            require_aligned: false,
            propagate_when_empty: true,
        }
    }
}

/// Configuration for the provider manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum length of one provider request.
    pub chunk_span: Duration,
    /// Number of providers tried per fetch, in priority order.
    pub max_providers_tried: usize,
    /// Timeout applied to every individual provider call.
    pub provider_timeout: Duration,
    /// Priority overrides keyed by provider name; lower runs first.
    pub priority_overrides: HashMap<String, i32>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            chunk_span: Duration::from_secs(30 * 24 * 60 * 60),
            max_providers_tried: 2,
            provider_timeout: Duration::from_secs(90),
            priority_overrides: HashMap::new(),
        }
    }
}

/// Conversion from the wholesale unit providers report (EUR/MWh) to the
/// consumer unit stored in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceConversion {
    /// Divisor applied first (MWh to kWh).
    pub divisor: f64,
    /// Multiplier applied after division (EUR to cents).
    pub multiplier: f64,
    /// Tax factor, e.g. `1.255` for 25.5 % VAT.
    pub vat_rate: f64,
    /// Decimal places kept after rounding.
    pub decimals: u8,
}

impl Default for PriceConversion {
    fn default() -> Self {
        Self {
            divisor: 1000.0,
            multiplier: 100.0,
            vat_rate: 1.255,
            decimals: 2,
        }
    }
}

impl PriceConversion {
    /// Pass raw provider values through untouched, apart from rounding.
    #[must_use]
    pub const fn raw(decimals: u8) -> Self {
        Self {
            divisor: 1.0,
            multiplier: 1.0,
            vat_rate: 1.0,
            decimals,
        }
    }

    /// Convert a raw wholesale price. Non-finite input yields `None`.
    #[must_use]
    pub fn apply(&self, raw: f64) -> Option<f64> {
        if !raw.is_finite() {
            return None;
        }
        let value = raw / self.divisor * self.multiplier * self.vat_rate;
        let scale = 10f64.powi(i32::from(self.decimals));
        let rounded = (value * scale).round() / scale;
        rounded.is_finite().then_some(rounded)
    }
}

/// Configuration for a local request budget over a fixed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum number of calls allowed within a single window.
    pub limit: u64,
    /// Duration of the accounting window.
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: 400,
            window: Duration::from_secs(60),
        }
    }
}

/// Exponential retry configuration for transient transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` (1-based) waits `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
    /// HTTP statuses treated as transient.
    pub retry_statuses: Vec<u16>,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            retry_statuses: vec![500, 502, 503, 504],
            jitter_percent: 10,
        }
    }
}
