use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a price provider or by the manager rotating over them.
///
/// Individual providers only ever produce `Api` and `Data`. The manager adds
/// `Exhausted` and `NoProviders` once the whole rotation came back empty.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderError {
    /// Transport failure, unexpected HTTP status, timeout or rate limit.
    #[error("{provider} request failed: {message}")]
    Api {
        /// Provider name that failed.
        provider: String,
        /// HTTP status when the failure came from a response.
        status: Option<u16>,
        /// Human-readable error message.
        message: String,
    },

    /// The provider answered but the payload could not be interpreted.
    #[error("{provider} returned unusable data: {message}")]
    Data {
        /// Provider name that produced the payload.
        provider: String,
        /// Human-readable error message.
        message: String,
    },

    /// Every attempted provider came back empty or failed.
    #[error("no provider returned data after {tried} attempt(s)")]
    Exhausted {
        /// Number of providers tried.
        tried: usize,
        /// The last underlying failure, if any attempt failed rather than came back empty.
        last: Option<Box<ProviderError>>,
    },

    /// No provider is registered and available.
    #[error("no price providers available")]
    NoProviders,
}

impl ProviderError {
    /// Helper: build an `Api` error without an HTTP status.
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Helper: build an `Api` error for an unexpected HTTP status.
    pub fn status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Helper: build a `Data` error.
    pub fn data(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Data {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Helper: a call that exceeded its time budget.
    pub fn timeout(provider: impl Into<String>, timeout_ms: u64) -> Self {
        Self::api(provider, format!("timed out after {timeout_ms}ms"))
    }

    /// Helper: a call rejected by rate limiting, local or upstream.
    pub fn rate_limited(provider: impl Into<String>, reset_in_ms: u64) -> Self {
        Self::status(
            provider,
            429,
            format!("rate limited; retry in {reset_in_ms}ms"),
        )
    }

    /// True for transport and HTTP failures.
    #[must_use]
    pub const fn is_api(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// True for payload interpretation failures.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// HTTP status carried by an `Api` error.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a transport-level retry could plausibly succeed.
    ///
    /// Status-less `Api` errors (connect failures, timeouts) are retryable, as
    /// are `Api` errors whose status appears in `statuses`.
    #[must_use]
    pub fn is_retryable(&self, statuses: &[u16]) -> bool {
        match self {
            Self::Api { status: None, .. } => true,
            Self::Api {
                status: Some(s), ..
            } => statuses.contains(s),
            _ => false,
        }
    }

    /// Unwrap an `Exhausted` aggregate down to the last concrete failure.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Exhausted {
                last: Some(inner), ..
            } => inner.root(),
            other => other,
        }
    }
}

/// The persistent store could not complete an operation.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[error("storage {operation} failed: {message}")]
pub struct StorageError {
    /// Store operation label, e.g. `read_range` or `upsert_many`.
    pub operation: String,
    /// Human-readable error message.
    pub message: String,
}

impl StorageError {
    /// Helper: build a storage error for an operation label.
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Caller or configuration mistake detected before any I/O.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The requested range ends before it starts.
    #[error("invalid range: start {start} is after end {end}")]
    InvertedRange {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },

    /// A bound does not sit on the grid while strict alignment is required.
    #[error("{instant} is not aligned to the {step_secs}s grid")]
    Unaligned {
        /// Offending instant.
        instant: DateTime<Utc>,
        /// Grid step in seconds.
        step_secs: i64,
    },

    /// The grid step is non-positive or does not evenly divide a day.
    #[error("invalid grid step: {step_secs}s")]
    InvalidStep {
        /// Offending step in seconds.
        step_secs: i64,
    },

    /// The manager was built without any registered provider.
    #[error("no providers registered; add at least one via with_provider(...)")]
    NoProviders,

    /// Any other malformed configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error surfaced by a cache fill.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FillError {
    /// No provider could deliver data and the store had nothing to fall back to.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The store failed; fatal for the current fill.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The request was rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
