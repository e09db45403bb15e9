//! Nord Pool `DayAheadPrices` payload.

use std::collections::HashMap;

use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use spotfill_core::{PriceConversion, PricePoint};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DayAheadResponse {
    #[serde(default)]
    pub multi_area_entries: Vec<AreaEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AreaEntry {
    pub delivery_start: String,
    #[serde(default)]
    pub entry_per_area: HashMap<String, Option<f64>>,
}

/// Parse a `deliveryStart` value.
///
/// Values with an offset are used as is; naive values are wall-clock times in
/// `market_tz`, taking the earlier instant when a fall-back hour repeats.
pub(crate) fn parse_delivery_start(raw: &str, market_tz: Tz) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("invalid deliveryStart {raw:?}: {e}"))?;
    match market_tz.from_local_datetime(&naive) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Ok(t.with_timezone(&Utc)),
        LocalResult::None => Err(format!("deliveryStart {raw:?} does not exist in {market_tz}")),
    }
}

/// Turn one day's body into price points for `area`.
///
/// Entries without the area are skipped, as are non-finite prices. A `null`
/// price for the area is a data error.
pub(crate) fn parse_day(
    body: &str,
    area: &str,
    market_tz: Tz,
    conversion: &PriceConversion,
) -> Result<Vec<PricePoint>, String> {
    let resp: DayAheadResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed payload: {e}"))?;

    let mut out = Vec::with_capacity(resp.multi_area_entries.len());
    for entry in resp.multi_area_entries {
        let Some(raw) = entry.entry_per_area.get(area) else {
            continue;
        };
        let raw = raw.ok_or_else(|| {
            format!("null price for {area} at {}", entry.delivery_start)
        })?;
        let Some(price) = conversion.apply(raw) else {
            continue;
        };
        let timestamp = parse_delivery_start(&entry.delivery_start, market_tz)?;
        out.push(PricePoint::priced(timestamp, price));
    }
    Ok(out)
}
