//! Report envelopes produced by the manager and the fill engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Result of asking one provider for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// The provider returned this many points; the chunk is resolved.
    Filled {
        /// Number of points returned.
        points: usize,
    },
    /// The provider answered without data; the chunk stays unresolved.
    Empty,
    /// The provider failed; the chunk stays unresolved.
    Failed(ProviderError),
}

/// One provider call made while resolving a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAttempt {
    /// Provider name.
    pub provider: String,
    /// Chunk start (inclusive).
    pub start: DateTime<Utc>,
    /// Chunk end (inclusive).
    pub end: DateTime<Utc>,
    /// What the call produced.
    pub status: AttemptStatus,
}

/// Summary of a manager fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchReport {
    /// Every provider call, in the order it was made.
    pub attempts: Vec<ChunkAttempt>,
    /// Chunks no provider could fill within the budget.
    pub unresolved: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    /// Providers that were asked at least once.
    pub providers_tried: usize,
}

impl FetchReport {
    /// Last failure recorded across all attempts.
    #[must_use]
    pub fn last_error(&self) -> Option<&ProviderError> {
        self.attempts.iter().rev().find_map(|a| match &a.status {
            AttemptStatus::Failed(e) => Some(e),
            _ => None,
        })
    }

    /// Unresolved chunks on which every attempt failed.
    ///
    /// Nothing is known about these chunks; an unresolved chunk that some
    /// provider answered without data is not included.
    #[must_use]
    pub fn failed_chunks(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.unresolved
            .iter()
            .copied()
            .filter(|&(start, end)| {
                self.attempts
                    .iter()
                    .filter(|a| a.start == start && a.end == end)
                    .all(|a| matches!(a.status, AttemptStatus::Failed(_)))
            })
            .collect()
    }
}

/// Summary of one cache fill.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillReport {
    /// Rows that were already in the store for the requested range.
    pub cached: usize,
    /// Newly fetched rows persisted by this fill.
    pub fetched: usize,
    /// Tombstones persisted by this fill.
    pub tombstoned: usize,
    /// Missing slots skipped because they lie beyond the horizon.
    pub deferred: usize,
    /// Missing slots left open because every provider failed for their chunk.
    pub unconfirmed: usize,
    /// Provider failure absorbed by returning cached rows only.
    pub degraded: Option<ProviderError>,
}
