//! spotfill-middleware
//!
//! Wrappers that sit between the provider manager and a raw provider:
//!
//! - [`QuotaAwareProvider`]: rejects calls locally once a request budget for the
//!   current window is spent, instead of letting the upstream rate-limit us.
//! - [`RetryingProvider`]: retries transient transport failures with
//!   exponential backoff and jitter.
//! - [`ProviderBuilder`]: composes a raw provider with these layers.
#![warn(missing_docs)]

mod builder;
mod quota;
mod retry;

pub use crate::builder::ProviderBuilder;
pub use crate::quota::{QuotaAwareProvider, QuotaMiddleware};
pub use crate::retry::{RetryMiddleware, RetryingProvider, backoff_delay};
