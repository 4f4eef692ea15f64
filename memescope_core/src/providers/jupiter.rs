// Jupiter token API (recent + top-trending) normalization

use super::coerce::{count, first_count, first_number, first_text, number, passthrough};
use crate::error::CoreError;
use crate::models::{TokenRecord, WindowStats};
use log::debug;
use serde_json::{Map, Value};

const CONSUMED: &[&str] = &[
    "id",
    "mint",
    "address",
    "symbol",
    "name",
    "icon",
    "logoURI",
    "usdPrice",
    "price",
    "liquidity",
    "fdv",
    "mcap",
    "holderCount",
    "bondingCurve",
    "stats5m",
    "stats1h",
    "stats6h",
    "stats24h",
];

/// Map a Jupiter tokens/v2 payload to token records.
///
/// Accepts a bare array or an object wrapping it under `tokens` or `data`.
/// Entries without a usable mint are dropped.
pub fn normalize_jupiter(raw: &Value) -> Result<Vec<TokenRecord>, CoreError> {
    let entries = match raw {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("tokens")
            .or_else(|| obj.get("data"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CoreError::Parse("Jupiter payload has no token array".to_string())
            })?,
        _ => {
            return Err(CoreError::Parse(
                "Jupiter payload is neither an array nor an object".to_string(),
            ))
        }
    };

    let mut tokens = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_object().and_then(normalize_entry) {
            Some(token) => tokens.push(token),
            None => debug!("Skipping Jupiter entry without mint: {}", entry),
        }
    }
    Ok(tokens)
}

fn normalize_entry(obj: &Map<String, Value>) -> Option<TokenRecord> {
    let id = first_text(obj, &["id", "mint", "address"])?;
    Some(TokenRecord {
        id,
        symbol: first_text(obj, &["symbol"]).unwrap_or_default(),
        name: first_text(obj, &["name"]).unwrap_or_default(),
        icon: first_text(obj, &["icon", "logoURI"]),
        usd_price: first_number(obj, &["usdPrice", "price"]),
        liquidity: number(obj.get("liquidity")),
        fdv: number(obj.get("fdv")),
        mcap: number(obj.get("mcap")),
        holder_count: first_count(obj, &["holderCount"]),
        bonding_curve: number(obj.get("bondingCurve")),
        stats_5m: window(obj.get("stats5m")),
        stats_1h: window(obj.get("stats1h")),
        stats_6h: window(obj.get("stats6h")),
        stats_24h: window(obj.get("stats24h")),
        extra: passthrough(obj, CONSUMED),
    })
}

fn window(value: Option<&Value>) -> Option<WindowStats> {
    let obj = value?.as_object()?;
    let stats = WindowStats {
        price_change: number(obj.get("priceChange")),
        volume_change: number(obj.get("volumeChange")),
        liquidity_change: number(obj.get("liquidityChange")),
        holder_change: number(obj.get("holderChange")),
        buy_volume: number(obj.get("buyVolume")),
        sell_volume: number(obj.get("sellVolume")),
        num_buys: count(obj.get("numBuys")),
        num_sells: count(obj.get("numSells")),
        num_traders: count(obj.get("numTraders")),
    };
    if stats.is_empty() {
        None
    } else {
        Some(stats)
    }
}
