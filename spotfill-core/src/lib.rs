//! spotfill-core
//!
//! Contracts and pure logic shared across the spotfill workspace.
//!
//! - `provider`: the `PriceProvider` trait every upstream source implements.
//! - `store`: the `PriceStore` trait backing the write-through cache.
//! - `middleware`: the `Middleware` trait for provider wrappers.
//! - `timeseries`: grid arithmetic, chunking, granularity expansion and merging.
//! - `horizon`: publication-horizon evaluation.
//! - `clock`: injectable source of "now".
#![warn(missing_docs)]

/// Injectable wall clock.
pub mod clock;
/// Publication-horizon evaluation.
pub mod horizon;
/// Middleware trait implemented by provider wrappers.
pub mod middleware;
/// The `PriceProvider` trait.
pub mod provider;
/// The `PriceStore` trait.
pub mod store;
/// Time-grid utilities.
pub mod timeseries;

pub use clock::{Clock, SystemClock};
pub use horizon::Horizon;
pub use middleware::Middleware;
pub use provider::PriceProvider;
pub use store::PriceStore;
pub use timeseries::chunk::chunk_range;
pub use timeseries::expand::expand_to_grid;
pub use timeseries::grid::TimeGrid;
pub use timeseries::merge::{dedup_sorted, merge_by_priority};

pub use spotfill_types::{
    AttemptStatus, ChunkAttempt, FetchReport, FillConfig, FillError, FillReport, HorizonPolicy,
    ManagerConfig, PriceConversion, PricePoint, ProviderError, ProviderKey, QuotaConfig,
    RetryConfig, StorageError, ValidationError,
};
