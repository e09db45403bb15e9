use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::HorizonPolicy;

/// Latest slot start the engine may ask providers for, evaluated at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Everything is eligible.
    Unbounded,
    /// Slots strictly before the instant are eligible.
    Before(DateTime<Utc>),
    /// Slots at or before the instant are eligible.
    Through(DateTime<Utc>),
}

impl Horizon {
    /// Evaluate `policy` at `now`.
    ///
    /// For `DailyCutoff`, before the local cutoff only the current local day is
    /// eligible; from the cutoff on, the next local day is eligible through
    /// `next_day_until`. When a local instant cannot be resolved (a DST gap
    /// that even an hour's shift does not clear) only past slots are admitted.
    #[must_use]
    pub fn at(policy: &HorizonPolicy, now: DateTime<Utc>) -> Self {
        match *policy {
            HorizonPolicy::Unbounded => Self::Unbounded,
            HorizonPolicy::DailyCutoff {
                timezone,
                cutoff,
                next_day_until,
            } => {
                let local = now.with_timezone(&timezone);
                let today = local.date_naive();
                let Some(tomorrow) = today.succ_opt() else {
                    return Self::Through(now);
                };
                let bound = if local.time() < cutoff {
                    resolve_local(timezone, tomorrow.and_time(NaiveTime::MIN)).map(Self::Before)
                } else {
                    resolve_local(timezone, tomorrow.and_time(next_day_until)).map(Self::Through)
                };
                bound.unwrap_or(Self::Through(now))
            }
            _ => Self::Unbounded,
        }
    }

    /// Whether a slot starting at `t` is eligible.
    #[must_use]
    pub fn admits(&self, t: DateTime<Utc>) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Before(limit) => t < *limit,
            Self::Through(limit) => t <= *limit,
        }
    }
}

// Ambiguous wall times map to the earlier instant; a gap is skipped forward by an hour.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Some(t.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .map(|t| t.with_timezone(&Utc)),
    }
}
