use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-window trading statistics as reported by the token providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_buys: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_sells: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_traders: Option<u64>,
}

impl WindowStats {
    pub fn is_empty(&self) -> bool {
        *self == WindowStats::default()
    }

    /// Overwrite every field the other block carries a value for.
    pub fn merge_from(&mut self, other: &WindowStats) {
        merge_opt(&mut self.price_change, other.price_change);
        merge_opt(&mut self.volume_change, other.volume_change);
        merge_opt(&mut self.liquidity_change, other.liquidity_change);
        merge_opt(&mut self.holder_change, other.holder_change);
        merge_opt(&mut self.buy_volume, other.buy_volume);
        merge_opt(&mut self.sell_volume, other.sell_volume);
        merge_opt(&mut self.num_buys, other.num_buys);
        merge_opt(&mut self.num_sells, other.num_sells);
        merge_opt(&mut self.num_traders, other.num_traders);
    }
}

/// Normalized token descriptor shared by every feed. `id` is the mint address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fdv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonding_curve: Option<f64>,
    #[serde(rename = "stats5m", default, skip_serializing_if = "Option::is_none")]
    pub stats_5m: Option<WindowStats>,
    #[serde(rename = "stats1h", default, skip_serializing_if = "Option::is_none")]
    pub stats_1h: Option<WindowStats>,
    #[serde(rename = "stats6h", default, skip_serializing_if = "Option::is_none")]
    pub stats_6h: Option<WindowStats>,
    #[serde(rename = "stats24h", default, skip_serializing_if = "Option::is_none")]
    pub stats_24h: Option<WindowStats>,
    /// Provider fields without a dedicated slot, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Serialized names of the typed `TokenRecord` fields. Flattened `extra`
/// keys must never reuse them or the record would carry duplicate keys.
pub const TOKEN_RECORD_FIELDS: &[&str] = &[
    "id",
    "symbol",
    "name",
    "icon",
    "usdPrice",
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

impl TokenRecord {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Field-level merge. Fields missing from `other` never erase ours, so
    /// applying the same record twice is the same as applying it once.
    pub fn merge_from(&mut self, other: &TokenRecord) {
        if !other.symbol.is_empty() {
            self.symbol = other.symbol.clone();
        }
        if !other.name.is_empty() {
            self.name = other.name.clone();
        }
        if other.icon.is_some() {
            self.icon = other.icon.clone();
        }
        merge_opt(&mut self.usd_price, other.usd_price);
        merge_opt(&mut self.liquidity, other.liquidity);
        merge_opt(&mut self.fdv, other.fdv);
        merge_opt(&mut self.mcap, other.mcap);
        merge_opt(&mut self.holder_count, other.holder_count);
        merge_opt(&mut self.bonding_curve, other.bonding_curve);
        merge_stats(&mut self.stats_5m, &other.stats_5m);
        merge_stats(&mut self.stats_1h, &other.stats_1h);
        merge_stats(&mut self.stats_6h, &other.stats_6h);
        merge_stats(&mut self.stats_24h, &other.stats_24h);
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

fn merge_opt<T: Copy>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn merge_stats(slot: &mut Option<WindowStats>, incoming: &Option<WindowStats>) {
    match (slot.as_mut(), incoming) {
        (Some(current), Some(next)) => current.merge_from(next),
        (None, Some(next)) => *slot = Some(next.clone()),
        _ => {}
    }
}

/// The single current state of a feed, as served over REST and SSE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Bumped on every mutation; orders publications, never serialized.
    #[serde(skip)]
    pub version: u64,
}

impl Snapshot {
    /// True once at least one poll has succeeded.
    pub fn has_data(&self) -> bool {
        self.fetched_at.is_some()
    }

    /// Data is present but the most recent poll failed.
    pub fn is_stale(&self) -> bool {
        self.fetched_at.is_some() && self.error.is_some()
    }
}

/// How a successful poll is folded into the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Wholesale replacement on every poll.
    Replace,
    /// Accumulate across polls keyed by id.
    Merge,
}

/// The three independent feeds served by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    JupiterRecent,
    JupiterTopTrending,
    Gmgn,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [
        FeedKind::JupiterRecent,
        FeedKind::JupiterTopTrending,
        FeedKind::Gmgn,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            FeedKind::JupiterRecent => "jupiter_recent",
            FeedKind::JupiterTopTrending => "jupiter_top_trending",
            FeedKind::Gmgn => "gmgn",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        FeedKind::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    /// REST path of the snapshot endpoint; `/stream` and admin paths hang off it.
    pub fn route_prefix(&self) -> &'static str {
        match self {
            FeedKind::JupiterRecent => "/api/jupiter/recent",
            FeedKind::JupiterTopTrending => "/api/jupiter/top-trending",
            FeedKind::Gmgn => "/api/gmgn/tokens",
        }
    }

    pub fn stream_path(&self) -> String {
        format!("{}/stream", self.route_prefix())
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_fields_missing_from_update() {
        let mut current = TokenRecord::new("m1", "AAA");
        current.name = "Alpha".to_string();
        current.liquidity = Some(10.0);

        let mut update = TokenRecord::new("m1", "");
        update.usd_price = Some(1.23);

        current.merge_from(&update);
        assert_eq!(current.symbol, "AAA");
        assert_eq!(current.name, "Alpha");
        assert_eq!(current.liquidity, Some(10.0));
        assert_eq!(current.usd_price, Some(1.23));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut update = TokenRecord::new("m1", "AAA");
        update.mcap = Some(5_000.0);
        update.stats_1h = Some(WindowStats {
            price_change: Some(-3.5),
            ..WindowStats::default()
        });
        update.extra.insert("launchpad".to_string(), json!("pump"));

        let mut once = TokenRecord::new("m1", "OLD");
        once.merge_from(&update);
        let mut twice = once.clone();
        twice.merge_from(&update);
        assert_eq!(once, twice);
    }

    #[test]
    fn snapshot_serializes_null_fetched_at_and_omits_error() {
        let value = serde_json::to_value(Snapshot::default()).unwrap();
        assert_eq!(value, json!({ "tokens": [], "fetchedAt": null }));
    }

    #[test]
    fn token_record_round_trips_passthrough_fields() {
        let raw = json!({
            "id": "m1",
            "symbol": "AAA",
            "usdPrice": 0.5,
            "stats5m": { "priceChange": 1.5 },
            "organicScore": 42
        });
        let record: TokenRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.stats_5m.as_ref().and_then(|s| s.price_change), Some(1.5));
        assert_eq!(record.extra.get("organicScore"), Some(&json!(42)));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back.get("organicScore"), Some(&json!(42)));
        assert_eq!(back.get("name"), Some(&json!("")));
    }

    #[test]
    fn feed_slugs_round_trip() {
        for kind in FeedKind::ALL {
            assert_eq!(FeedKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(FeedKind::from_slug("pumpfun"), None);
    }
}
