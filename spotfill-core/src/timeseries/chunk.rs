use chrono::{DateTime, TimeDelta, Utc};

/// Split the inclusive range `[start, end]` into consecutive inclusive chunks.
///
/// Each chunk covers at most `span`; consecutive chunks are separated by one
/// `step` so no slot is requested twice. When `start` is on the `step` grid,
/// every chunk boundary is as well. Chunks are returned chronologically.
#[must_use]
pub fn chunk_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span: TimeDelta,
    step: TimeDelta,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if start > end {
        return Vec::new();
    }
    if step <= TimeDelta::zero() {
        return vec![(start, end)];
    }
    let span = span.max(step);

    let mut out = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let chunk_end = cursor
            .checked_add_signed(span - step)
            .map_or(end, |e| e.min(end));
        out.push((cursor, chunk_end));
        match chunk_end.checked_add_signed(step) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    out
}
