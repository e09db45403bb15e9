//! Spotfill data transfer objects and configuration primitives.
//!
//! Everything here is plain data: price points, provider keys, the error
//! taxonomy shared by every crate in the workspace, configuration structs and
//! the report envelopes produced by the manager and the fill engine.
#![warn(missing_docs)]

mod config;
mod error;
mod point;
mod provider;
mod reports;

pub use config::{FillConfig, HorizonPolicy, ManagerConfig, PriceConversion, QuotaConfig, RetryConfig};
pub use error::{FillError, ProviderError, StorageError, ValidationError};
pub use point::PricePoint;
pub use provider::ProviderKey;
pub use reports::{AttemptStatus, ChunkAttempt, FetchReport, FillReport};
