use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::ValidationError;

const DAY_SECS: i64 = 86_400;

/// Fixed-step grid of slot starts aligned to the Unix epoch.
///
/// The grid is never persisted; expected slots are regenerated on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeGrid {
    step_secs: i64,
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self::quarter_hourly()
    }
}

impl TimeGrid {
    /// Build a grid with the given step.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidStep` when the step is zero, carries
    /// sub-second precision, or does not evenly divide a day.
    pub fn new(step: Duration) -> Result<Self, ValidationError> {
        let step_secs = i64::try_from(step.as_secs()).unwrap_or(i64::MAX);
        if step.subsec_nanos() != 0 || step_secs <= 0 || DAY_SECS % step_secs != 0 {
            return Err(ValidationError::InvalidStep { step_secs });
        }
        Ok(Self { step_secs })
    }

    /// The 15-minute grid used by the day-ahead market.
    #[must_use]
    pub const fn quarter_hourly() -> Self {
        Self { step_secs: 900 }
    }

    /// Hourly grid.
    #[must_use]
    pub const fn hourly() -> Self {
        Self { step_secs: 3600 }
    }

    /// Step in whole seconds.
    #[must_use]
    pub const fn step_secs(&self) -> i64 {
        self.step_secs
    }

    /// Step as a chrono delta.
    #[must_use]
    pub fn step(&self) -> TimeDelta {
        TimeDelta::seconds(self.step_secs)
    }

    /// Round down to the nearest grid boundary.
    #[must_use]
    pub fn floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let rem = t.timestamp().rem_euclid(self.step_secs);
        t - TimeDelta::seconds(rem) - TimeDelta::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
    }

    /// True when `t` sits exactly on a grid boundary.
    #[must_use]
    pub fn is_aligned(&self, t: DateTime<Utc>) -> bool {
        t.timestamp_subsec_nanos() == 0 && t.timestamp().rem_euclid(self.step_secs) == 0
    }

    /// Every slot start in `[floor(start), floor(end)]`, ascending.
    ///
    /// Empty when the floored start lies after the floored end.
    #[must_use]
    pub fn expected(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let first = self.floor(start);
        let last = self.floor(end);
        if first > last {
            return Vec::new();
        }
        let slots = (last - first).num_seconds() / self.step_secs + 1;
        let mut out = Vec::with_capacity(usize::try_from(slots).unwrap_or(0));
        let step = self.step();
        let mut cur = first;
        while cur <= last {
            out.push(cur);
            match cur.checked_add_signed(step) {
                Some(next) => cur = next,
                None => break,
            }
        }
        out
    }

    /// Expected slots not present in `present`.
    pub fn missing<I>(expected: &[DateTime<Utc>], present: I) -> BTreeSet<DateTime<Utc>>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let present: HashSet<DateTime<Utc>> = present.into_iter().collect();
        expected
            .iter()
            .copied()
            .filter(|t| !present.contains(t))
            .collect()
    }

    /// Check a requested range before any I/O.
    ///
    /// # Errors
    /// `InvertedRange` when `start > end`; `Unaligned` when `require_aligned`
    /// is set and either bound is off the grid.
    pub fn validate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        require_aligned: bool,
    ) -> Result<(), ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        if require_aligned {
            for instant in [start, end] {
                if !self.is_aligned(instant) {
                    return Err(ValidationError::Unaligned {
                        instant,
                        step_secs: self.step_secs,
                    });
                }
            }
        }
        Ok(())
    }
}
