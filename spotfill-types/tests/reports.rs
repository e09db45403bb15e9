use chrono::{DateTime, TimeZone, Utc};
use spotfill_types::{AttemptStatus, ChunkAttempt, FetchReport, ProviderError};

fn day(d: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, d, 23, 45, 0).unwrap(),
    )
}

fn attempt(provider: &str, chunk: (DateTime<Utc>, DateTime<Utc>), status: AttemptStatus) -> ChunkAttempt {
    ChunkAttempt {
        provider: provider.to_string(),
        start: chunk.0,
        end: chunk.1,
        status,
    }
}

#[test]
fn failed_chunks_are_unresolved_chunks_nobody_answered() {
    let down = || AttemptStatus::Failed(ProviderError::status("a", 503, "down"));
    let report = FetchReport {
        attempts: vec![
            attempt("a", day(1), AttemptStatus::Filled { points: 24 }),
            attempt("a", day(2), down()),
            attempt("a", day(3), down()),
            attempt("b", day(2), down()),
            attempt("b", day(3), AttemptStatus::Empty),
        ],
        unresolved: vec![day(2), day(3)],
        providers_tried: 2,
    };

    assert_eq!(report.failed_chunks(), vec![day(2)]);
    assert_eq!(report.last_error().and_then(ProviderError::http_status), Some(503));
}

#[test]
fn resolved_ranges_have_no_failed_chunks() {
    let report = FetchReport {
        attempts: vec![
            attempt("a", day(1), AttemptStatus::Failed(ProviderError::api("a", "reset"))),
            attempt("b", day(1), AttemptStatus::Filled { points: 24 }),
        ],
        unresolved: vec![],
        providers_tried: 2,
    };
    assert!(report.failed_chunks().is_empty());
}
