//! Deterministic test doubles for the spotfill workspace.
//!
//! - [`MockProvider`]: a provider whose answers are scripted by a [`MockController`].
//! - [`MemoryPriceStore`]: an in-memory store with the same insert-if-absent
//!   semantics as the SQLite store, plus failure injection.
//! - [`FixedClock`]: a settable clock.

mod clock;
mod provider;
mod store;

pub use clock::FixedClock;
pub use provider::{MockBehavior, MockController, MockProvider};
pub use store::MemoryPriceStore;
