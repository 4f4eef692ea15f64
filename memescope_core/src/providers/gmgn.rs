// GMGN rank/token API normalization

use super::coerce::{first_count, first_text, number, passthrough};
use crate::error::CoreError;
use crate::models::{TokenRecord, WindowStats};
use log::debug;
use serde_json::{Map, Value};

const CONSUMED: &[&str] = &[
    "address",
    "token_address",
    "symbol",
    "name",
    "logo",
    "price",
    "liquidity",
    "fdv",
    "market_cap",
    "holder_count",
    "progress",
    "launchpad_progress",
    "price_change_percent5m",
    "price_change_percent1h",
    "price_change_percent6h",
    "price_change_percent24h",
    "buys",
    "sells",
];

/// Map a GMGN response to token records.
///
/// GMGN wraps results as `{ code, msg, data: { rank: [...] } }`; a non-zero
/// `code` is an upstream error even when the HTTP status was 200.
pub fn normalize_gmgn(raw: &Value) -> Result<Vec<TokenRecord>, CoreError> {
    if let Some(code) = raw.get("code").and_then(Value::as_i64) {
        if code != 0 {
            let msg = raw.get("msg").and_then(Value::as_str).unwrap_or("unknown");
            return Err(CoreError::Parse(format!("GMGN error code {}: {}", code, msg)));
        }
    }

    let entries = locate_entries(raw)
        .ok_or_else(|| CoreError::Parse("GMGN payload has no token array".to_string()))?;

    let mut tokens = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_object().and_then(normalize_entry) {
            Some(token) => tokens.push(token),
            None => debug!("Skipping GMGN entry without address: {}", entry),
        }
    }
    Ok(tokens)
}

fn locate_entries(raw: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = raw.as_array() {
        return Some(items);
    }
    let data = raw.get("data")?;
    data.as_array()
        .or_else(|| data.get("rank").and_then(Value::as_array))
        .or_else(|| data.get("tokens").and_then(Value::as_array))
}

fn normalize_entry(obj: &Map<String, Value>) -> Option<TokenRecord> {
    let id = first_text(obj, &["address", "token_address"])?;
    let market_cap = number(obj.get("market_cap"));
    Some(TokenRecord {
        id,
        symbol: first_text(obj, &["symbol"]).unwrap_or_default(),
        name: first_text(obj, &["name"]).unwrap_or_default(),
        icon: first_text(obj, &["logo"]),
        usd_price: number(obj.get("price")),
        liquidity: number(obj.get("liquidity")),
        fdv: number(obj.get("fdv")).or(market_cap),
        mcap: market_cap,
        holder_count: first_count(obj, &["holder_count"]),
        bonding_curve: bonding_curve(obj),
        stats_5m: price_window(obj, "price_change_percent5m"),
        stats_1h: hour_window(obj),
        stats_6h: price_window(obj, "price_change_percent6h"),
        stats_24h: price_window(obj, "price_change_percent24h"),
        extra: passthrough(obj, CONSUMED),
    })
}

/// Bonding-curve completion as a percentage. The rank endpoint's `progress`
/// is a 0..1 fraction; `launchpad_progress` is already a percentage.
fn bonding_curve(obj: &Map<String, Value>) -> Option<f64> {
    number(obj.get("progress"))
        .map(|fraction| fraction * 100.0)
        .or_else(|| number(obj.get("launchpad_progress")))
}

fn price_window(obj: &Map<String, Value>, key: &str) -> Option<WindowStats> {
    number(obj.get(key)).map(|change| WindowStats {
        price_change: Some(change),
        ..WindowStats::default()
    })
}

// The rank endpoint's swap counts cover the requested 1h window.
fn hour_window(obj: &Map<String, Value>) -> Option<WindowStats> {
    let stats = WindowStats {
        price_change: number(obj.get("price_change_percent1h")),
        num_buys: first_count(obj, &["buys"]),
        num_sells: first_count(obj, &["sells"]),
        ..WindowStats::default()
    };
    if stats.is_empty() {
        None
    } else {
        Some(stats)
    }
}
