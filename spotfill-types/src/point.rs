use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One slot of the price series.
///
/// `price == None` is a tombstone: every provider was asked and none had data
/// for this slot. A tombstone is a confirmed absence, which is different from a
/// slot that has never been fetched (no row at all).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Slot start, UTC.
    pub timestamp: DateTime<Utc>,
    /// Consumer price for the slot, or `None` for a tombstone.
    pub price: Option<f64>,
}

impl PricePoint {
    /// A slot with a known price.
    #[must_use]
    pub const fn priced(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            price: Some(price),
        }
    }

    /// A slot confirmed to have no data.
    #[must_use]
    pub const fn tombstone(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            price: None,
        }
    }

    /// True when this point marks a confirmed absence.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.price.is_none()
    }
}
