//! spotfill keeps a gapless grid of day-ahead electricity prices in a
//! persistent store, fetching only what is missing from fallback-ordered
//! providers.
//!
//! Overview
//! - [`ProviderManager`] rotates over registered `PriceProvider`s by priority,
//!   splitting long ranges into chunks and falling back per chunk.
//! - [`CacheFillEngine`] reads the store, computes missing grid slots, applies
//!   the publication horizon, fetches, expands coarse data onto the grid,
//!   persists new rows and records tombstones for slots confirmed empty.
//! - [`Settings`] reads deployment configuration from the environment.
//!
//! Key behaviors
//! - Stored rows are never overwritten; concurrent fills converge because the
//!   store inserts only absent timestamps.
//! - Tombstones are written only after a fetch succeeded, and only for
//!   chunks some provider answered. A failed fetch writes nothing and the
//!   fill falls back to whatever the store had; chunks every provider
//!   failed on stay open for the next fill.
//! - Slots past the horizon are neither fetched nor tombstoned.
//!
//! Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use spotfill::{CacheFillEngine, ProviderManager};
//!
//! let manager = ProviderManager::builder()
//!     .with_provider(Arc::new(NordpoolProvider::new_default()?))
//!     .with_provider(Arc::new(EntsoeProvider::from_env()?))
//!     .build()?;
//!
//! let engine = CacheFillEngine::builder()
//!     .store(Arc::new(SqlitePriceStore::connect("sqlite://prices.db").await?))
//!     .manager(Arc::new(manager))
//!     .build()?;
//!
//! let series = engine.fill(start, end).await?;
//! ```
#![warn(missing_docs)]

mod engine;
mod manager;
mod settings;

pub use crate::engine::{CacheFillEngine, CacheFillEngineBuilder};
pub use crate::manager::{ProviderManager, ProviderManagerBuilder};
pub use crate::settings::{DEFAULT_DATABASE_URL, Settings, SettingsError};

pub use spotfill_core::{
    AttemptStatus, ChunkAttempt, Clock, FetchReport, FillConfig, FillError, FillReport,
    HorizonPolicy, ManagerConfig, PriceConversion, PricePoint, PriceProvider, PriceStore,
    ProviderError, ProviderKey, QuotaConfig, RetryConfig, StorageError, SystemClock, TimeGrid,
    ValidationError,
};
pub use spotfill_middleware::{ProviderBuilder, QuotaMiddleware, RetryMiddleware};
