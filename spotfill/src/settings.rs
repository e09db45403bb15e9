//! Deployment settings read from the environment (and a `.env` file).

use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use thiserror::Error;

use spotfill_core::{
    FillConfig, HorizonPolicy, ManagerConfig, PriceConversion, TimeGrid, ValidationError,
};

use crate::manager::{ProviderManager, ProviderManagerBuilder};

/// Default SQLite database location, relative to the working directory.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/electricity_prices.db";

/// A setting was present but could not be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {key}={value:?}: {reason}")]
pub struct SettingsError {
    /// Environment variable name.
    pub key: &'static str,
    /// Raw value found.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl SettingsError {
    fn new(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Everything a deployment needs to wire a store, providers and the engine.
///
/// | variable | effect |
/// |---|---|
/// | `DATABASE_URL` | SQLite URL for the store |
/// | `ENTSOE_API_KEY` | enables the ENTSO-E provider |
/// | `SPOTFILL_GRID_MINUTES` | grid step |
/// | `SPOTFILL_CHUNK_DAYS` | manager chunk span |
/// | `SPOTFILL_MAX_PROVIDERS` | providers tried per fetch |
/// | `SPOTFILL_PROVIDER_TIMEOUT_SECS` | per-call timeout in the manager |
/// | `SPOTFILL_MARKET_TZ` | horizon timezone |
/// | `SPOTFILL_PUBLISH_CUTOFF` | local `HH:MM` publication time, or `none` for no horizon |
/// | `SPOTFILL_VAT_RATE` | VAT factor of the price conversion |
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite URL for the store.
    pub database_url: String,
    /// ENTSO-E security token, if configured.
    pub entsoe_api_key: Option<String>,
    /// Engine configuration.
    pub fill: FillConfig,
    /// Manager configuration.
    pub manager: ManagerConfig,
    /// Unit conversion handed to providers.
    pub conversion: PriceConversion,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            entsoe_api_key: None,
            fill: FillConfig::default(),
            manager: ManagerConfig::default(),
            conversion: PriceConversion::default(),
        }
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, SettingsError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(SettingsError::new(key, raw, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(SettingsError::new(key, raw, e.to_string())),
    }
}

impl Settings {
    /// Load `.env` if present, then read settings from the process environment.
    ///
    /// # Errors
    /// Returns `SettingsError` for the first variable that is set but invalid.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns `SettingsError` for the first variable that is set but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut s = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            s.database_url = url;
        }
        s.entsoe_api_key = get("ENTSOE_API_KEY");

        if let Some(raw) = get("SPOTFILL_GRID_MINUTES") {
            let key = "SPOTFILL_GRID_MINUTES";
            let step = Duration::from_secs(parse_positive(key, &raw)?.saturating_mul(60));
            TimeGrid::new(step).map_err(|e| SettingsError::new(key, &raw, e.to_string()))?;
            s.fill.grid_step = step;
        }
        if let Some(raw) = get("SPOTFILL_CHUNK_DAYS") {
            let days = parse_positive("SPOTFILL_CHUNK_DAYS", &raw)?;
            s.manager.chunk_span = Duration::from_secs(days.saturating_mul(86_400));
        }
        if let Some(raw) = get("SPOTFILL_MAX_PROVIDERS") {
            let key = "SPOTFILL_MAX_PROVIDERS";
            let n = parse_positive(key, &raw)?;
            s.manager.max_providers_tried =
                usize::try_from(n).map_err(|e| SettingsError::new(key, &raw, e.to_string()))?;
        }
        if let Some(raw) = get("SPOTFILL_PROVIDER_TIMEOUT_SECS") {
            let secs = parse_positive("SPOTFILL_PROVIDER_TIMEOUT_SECS", &raw)?;
            s.manager.provider_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = get("SPOTFILL_PUBLISH_CUTOFF") {
            let key = "SPOTFILL_PUBLISH_CUTOFF";
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("none") {
                s.fill.horizon = HorizonPolicy::Unbounded;
            } else {
                let at = NaiveTime::parse_from_str(trimmed, "%H:%M")
                    .map_err(|e| SettingsError::new(key, &raw, e.to_string()))?;
                s.fill.horizon = match s.fill.horizon {
                    HorizonPolicy::DailyCutoff {
                        timezone,
                        next_day_until,
                        ..
                    } => HorizonPolicy::DailyCutoff {
                        timezone,
                        cutoff: at,
                        next_day_until,
                    },
                    other => other,
                };
            }
        }
        if let Some(raw) = get("SPOTFILL_MARKET_TZ") {
            let tz: Tz = raw
                .trim()
                .parse()
                .map_err(|e| SettingsError::new("SPOTFILL_MARKET_TZ", &raw, format!("{e}")))?;
            if let HorizonPolicy::DailyCutoff {
                cutoff,
                next_day_until,
                ..
            } = s.fill.horizon
            {
                s.fill.horizon = HorizonPolicy::DailyCutoff {
                    timezone: tz,
                    cutoff,
                    next_day_until,
                };
            }
        }

        if let Some(raw) = get("SPOTFILL_VAT_RATE") {
            let key = "SPOTFILL_VAT_RATE";
            let rate: f64 = raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseFloatError| SettingsError::new(key, &raw, e.to_string()))?;
            if !rate.is_finite() || rate <= 0.0 {
                return Err(SettingsError::new(key, &raw, "must be a positive factor"));
            }
            s.conversion.vat_rate = rate;
        }

        Ok(s)
    }

    /// Manager builder with this deployment's manager config, chunking on
    /// the fill grid.
    ///
    /// # Errors
    /// `InvalidStep` when `fill.grid_step` does not divide a day.
    pub fn manager_builder(&self) -> Result<ProviderManagerBuilder, ValidationError> {
        ProviderManager::builder()
            .config(self.manager.clone())
            .grid_step(self.fill.grid_step)
    }
}
