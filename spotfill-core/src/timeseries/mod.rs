//! Time-series utilities shared by providers, the manager and the engine.
//!
//! Modules include:
//! - `grid`: the canonical slot grid (floor, expected slots, gaps)
//! - `chunk`: split long ranges into provider-sized requests
//! - `expand`: replicate coarse provider output onto a finer grid
//! - `merge`: first-wins de-duplication by timestamp
/// Range chunking helpers.
pub mod chunk;
/// Coarse-to-grid expansion.
pub mod expand;
/// Grid arithmetic.
pub mod grid;
/// Merge and de-duplication of point series.
pub mod merge;
