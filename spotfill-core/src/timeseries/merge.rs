use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use crate::PricePoint;

/// Merge point series in priority order (first is highest).
///
/// Points are keyed by timestamp; the first appearance wins for duplicates.
/// The result is sorted ascending.
pub fn merge_by_priority<I>(sources: I) -> Vec<PricePoint>
where
    I: IntoIterator<Item = Vec<PricePoint>>,
{
    let mut by_ts: BTreeMap<DateTime<Utc>, PricePoint> = BTreeMap::new();
    for source in sources {
        for p in source {
            if let Entry::Vacant(v) = by_ts.entry(p.timestamp) {
                v.insert(p);
            }
        }
    }
    by_ts.into_values().collect()
}

/// De-duplicate a single series by timestamp (first wins) and sort it.
#[must_use]
pub fn dedup_sorted(points: Vec<PricePoint>) -> Vec<PricePoint> {
    merge_by_priority([points])
}
