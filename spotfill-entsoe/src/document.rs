//! ENTSO-E market document parsing.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

use spotfill_core::{PriceConversion, PricePoint};

/// Curve type under which omitted positions repeat the previous price.
const VARIABLE_BLOCK_CURVE: &str = "A03";

/// Acknowledgement reason code for "no matching data found".
const NO_DATA_REASON: &str = "999";

/// Upper bound on positions in one period: a leap year at one-minute resolution.
const MAX_PERIOD_SLOTS: i64 = 366 * 24 * 60;

#[derive(Debug, Deserialize)]
struct PublicationDocument {
    #[serde(rename = "TimeSeries", default)]
    time_series: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(rename = "curveType", default)]
    curve_type: Option<String>,
    #[serde(rename = "Period", default)]
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
struct Period {
    #[serde(rename = "timeInterval")]
    time_interval: TimeInterval,
    resolution: String,
    #[serde(rename = "Point", default)]
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct TimeInterval {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct Point {
    position: u32,
    #[serde(rename = "price.amount", default)]
    price_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AcknowledgementDocument {
    #[serde(rename = "Reason", default)]
    reasons: Vec<Reason>,
}

#[derive(Debug, Deserialize)]
struct Reason {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Outcome of reading a response body.
#[derive(Debug)]
pub(crate) enum Parsed {
    Points(Vec<PricePoint>),
    /// The platform acknowledged the query but has nothing for it.
    NoData(String),
}

fn root_element(body: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err("empty document".to_string()),
            Ok(_) => {}
            Err(e) => return Err(format!("malformed xml: {e}")),
        }
    }
}

/// Parse `2024-01-01T23:00Z`, the platform's interval timestamp format.
pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ")
        .map(|n| n.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc)))
        .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
}

/// Parse an ISO-8601 duration of the forms `PT{n}M`, `PT{n}H` or `P{n}D`.
pub(crate) fn parse_resolution(raw: &str) -> Result<TimeDelta, String> {
    let raw = raw.trim();
    let bad = || format!("unsupported resolution {raw:?}");
    let (in_time, rest) = match raw.strip_prefix("PT") {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('P').ok_or_else(bad)?),
    };
    let unit = rest.chars().last().ok_or_else(bad)?;
    let digits = &rest[..rest.len() - unit.len_utf8()];
    let n: i64 = digits.parse().map_err(|_| bad())?;
    if !(1..=10_000).contains(&n) {
        return Err(bad());
    }
    match (in_time, unit) {
        (true, 'M') => Ok(TimeDelta::minutes(n)),
        (true, 'H') => Ok(TimeDelta::hours(n)),
        (false, 'D') => Ok(TimeDelta::days(n)),
        _ => Err(bad()),
    }
}

fn period_points(
    period: &Period,
    fill_forward: bool,
    conversion: &PriceConversion,
) -> Result<Vec<PricePoint>, String> {
    let start = parse_instant(&period.time_interval.start)?;
    let end = parse_instant(&period.time_interval.end)?;
    let resolution = parse_resolution(&period.resolution)?;
    if end <= start {
        return Err(format!("period end {end} is not after its start {start}"));
    }

    let span_slots = (end - start).num_seconds() / resolution.num_seconds();
    if !(1..=MAX_PERIOD_SLOTS).contains(&span_slots) {
        return Err(format!(
            "period {start}..{end} at {} spans {span_slots} positions",
            period.resolution.trim()
        ));
    }
    let last_pos = u32::try_from(span_slots).map_err(|e| e.to_string())?;

    let mut by_position: Vec<(u32, f64)> = period
        .points
        .iter()
        .filter_map(|p| p.price_amount.map(|a| (p.position, a)))
        .collect();
    if let Some((pos, _)) = by_position.iter().find(|(pos, _)| !(1..=last_pos).contains(pos)) {
        return Err(format!("position {pos} outside period of {last_pos} positions"));
    }
    by_position.sort_by_key(|(pos, _)| *pos);
    by_position.dedup_by_key(|(pos, _)| *pos);

    let slot = |pos: u32| -> Result<DateTime<Utc>, String> {
        i32::try_from(pos - 1)
            .ok()
            .and_then(|offset| resolution.checked_mul(offset))
            .and_then(|delta| start.checked_add_signed(delta))
            .ok_or_else(|| format!("position {pos} overflows the period start {start}"))
    };

    let mut out = Vec::new();
    if !fill_forward {
        for (pos, amount) in by_position {
            if let Some(price) = conversion.apply(amount) {
                out.push(PricePoint::priced(slot(pos)?, price));
            }
        }
        return Ok(out);
    }

    out.reserve(usize::try_from(last_pos).unwrap_or(0));
    let mut listed = by_position.into_iter().peekable();
    let mut current: Option<f64> = None;
    for pos in 1..=last_pos {
        if let Some((_, amount)) = listed.next_if(|(p, _)| *p == pos) {
            current = Some(amount);
        }
        if let Some(price) = current.and_then(|a| conversion.apply(a)) {
            out.push(PricePoint::priced(slot(pos)?, price));
        }
    }
    Ok(out)
}

/// Interpret a 200 response body.
///
/// `Publication_MarketDocument` yields points (A03 curves filled forward to
/// the period end). An `Acknowledgement_MarketDocument` with the "no matching
/// data" reason yields `NoData`; any other acknowledgement is an error.
pub(crate) fn parse_body(body: &str, conversion: &PriceConversion) -> Result<Parsed, String> {
    let root = root_element(body)?;
    match root.as_str() {
        "Publication_MarketDocument" => {
            let doc: PublicationDocument =
                quick_xml::de::from_str(body).map_err(|e| format!("malformed document: {e}"))?;
            let mut out = Vec::new();
            for ts in &doc.time_series {
                let fill_forward = ts.curve_type.as_deref() == Some(VARIABLE_BLOCK_CURVE);
                for period in &ts.periods {
                    out.extend(period_points(period, fill_forward, conversion)?);
                }
            }
            Ok(Parsed::Points(out))
        }
        "Acknowledgement_MarketDocument" => {
            let ack: AcknowledgementDocument = quick_xml::de::from_str(body)
                .map_err(|e| format!("malformed acknowledgement: {e}"))?;
            let text = ack
                .reasons
                .iter()
                .filter_map(|r| r.text.as_deref())
                .collect::<Vec<_>>()
                .join("; ");
            let no_data = ack
                .reasons
                .iter()
                .any(|r| r.code.as_deref() == Some(NO_DATA_REASON));
            if no_data || ack.reasons.is_empty() {
                Ok(Parsed::NoData(text))
            } else {
                Err(format!("request rejected: {text}"))
            }
        }
        other => Err(format!("unexpected document type {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolutions() {
        assert_eq!(parse_resolution("PT15M").unwrap(), TimeDelta::minutes(15));
        assert_eq!(parse_resolution("PT60M").unwrap(), TimeDelta::hours(1));
        assert_eq!(parse_resolution("PT1H").unwrap(), TimeDelta::hours(1));
        assert_eq!(parse_resolution("P1D").unwrap(), TimeDelta::days(1));
        assert!(parse_resolution("P1Y").is_err());
        assert!(parse_resolution("PT0M").is_err());
        assert!(parse_resolution("garbage").is_err());
    }

    #[test]
    fn instants() {
        let t = parse_instant("2024-01-01T23:00Z").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-01T23:00:00+00:00");
        assert!(parse_instant("yesterday").is_err());
    }

    fn period(start: &str, end: &str, resolution: &str, points: &[(u32, f64)]) -> Period {
        Period {
            time_interval: TimeInterval {
                start: start.to_string(),
                end: end.to_string(),
            },
            resolution: resolution.to_string(),
            points: points
                .iter()
                .map(|&(position, amount)| Point {
                    position,
                    price_amount: Some(amount),
                })
                .collect(),
        }
    }

    #[test]
    fn inverted_period_is_rejected() {
        let p = period("2024-01-02T00:00Z", "2024-01-01T00:00Z", "PT60M", &[(1, 10.0)]);
        let conv = PriceConversion::raw(2);
        assert!(period_points(&p, true, &conv).unwrap_err().contains("not after"));
        assert!(period_points(&p, false, &conv).is_err());

        let empty = period("2024-01-01T00:00Z", "2024-01-01T00:00Z", "PT60M", &[(1, 10.0)]);
        assert!(period_points(&empty, true, &conv).is_err());
    }

    #[test]
    fn positions_outside_the_period_are_rejected() {
        let conv = PriceConversion::raw(2);
        for pos in [0, 25, u32::MAX] {
            let p = period("2024-01-01T00:00Z", "2024-01-02T00:00Z", "PT60M", &[(1, 1.0), (pos, 2.0)]);
            let err = period_points(&p, true, &conv).unwrap_err();
            assert!(err.contains("outside period"), "{pos}: {err}");
            assert!(period_points(&p, false, &conv).is_err());
        }
    }

    #[test]
    fn oversized_period_is_rejected() {
        let p = period("2000-01-01T00:00Z", "2100-01-01T00:00Z", "PT1M", &[(1, 1.0)]);
        assert!(period_points(&p, true, &PriceConversion::raw(2)).is_err());
    }

    #[test]
    fn last_position_lands_on_the_final_slot() {
        let p = period("2024-01-01T00:00Z", "2024-01-01T01:00Z", "PT15M", &[(1, 1.0), (4, 4.0)]);
        let pts = period_points(&p, false, &PriceConversion::raw(2)).unwrap();
        assert_eq!(pts[1].timestamp, parse_instant("2024-01-01T00:45Z").unwrap());
    }

    #[test]
    fn root_name_ignores_prolog_and_namespace() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Acknowledgement_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-1:acknowledgementdocument:7:0"></Acknowledgement_MarketDocument>"#;
        assert_eq!(root_element(body).unwrap(), "Acknowledgement_MarketDocument");
    }
}
