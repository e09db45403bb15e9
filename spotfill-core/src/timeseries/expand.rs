use chrono::TimeDelta;

use crate::PricePoint;
use crate::timeseries::grid::TimeGrid;

/// Replicate coarse provider output onto a finer grid.
///
/// When the grid step is finer than `coarse`, and every point sits on a
/// `coarse` boundary, each point is expanded into the grid sub-slots of its
/// coarse interval carrying the same price. Anything else (mixed or already
/// fine-grained output) passes through unchanged.
#[must_use]
pub fn expand_to_grid(points: Vec<PricePoint>, grid: &TimeGrid, coarse: TimeDelta) -> Vec<PricePoint> {
    let coarse_secs = coarse.num_seconds();
    let step_secs = grid.step_secs();
    if points.is_empty() || coarse_secs <= step_secs || coarse_secs % step_secs != 0 {
        return points;
    }

    let on_coarse_boundary = |p: &PricePoint| {
        p.timestamp.timestamp_subsec_nanos() == 0 && p.timestamp.timestamp().rem_euclid(coarse_secs) == 0
    };
    if !points.iter().all(on_coarse_boundary) {
        return points;
    }

    let per_coarse = coarse_secs / step_secs;
    let step = grid.step();
    let mut out = Vec::with_capacity(points.len() * usize::try_from(per_coarse).unwrap_or(1));
    for p in points {
        let mut ts = p.timestamp;
        for _ in 0..per_coarse {
            out.push(PricePoint {
                timestamp: ts,
                price: p.price,
            });
            ts += step;
        }
    }
    out
}
