// Memescope WASM Bindings
// Streams feed snapshots into the browser through the core reducer

use memescope_core::reducer::{DRIP_INTERVAL_MS, MAX_DISPLAYED_TOKENS, QUEUE_BOUND_FACTOR};
use memescope_core::FeedKind;
use wasm_bindgen::prelude::*;

mod subscription;
pub use subscription::FeedSubscription;

// Initialize panic hook and logger for WASM
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Feed slugs accepted by `FeedSubscription`.
#[wasm_bindgen(js_name = feedNames)]
pub fn feed_names() -> Vec<JsValue> {
    FeedKind::ALL
        .iter()
        .map(|kind| JsValue::from_str(kind.slug()))
        .collect()
}

/// REST path of a feed's snapshot endpoint, e.g. for an initial fetch.
#[wasm_bindgen(js_name = feedPath)]
pub fn feed_path(feed: &str) -> Result<String, JsValue> {
    FeedKind::from_slug(feed)
        .map(|kind| kind.route_prefix().to_string())
        .ok_or_else(|| JsValue::from_str(&format!("Unknown feed: {}", feed)))
}

/// Display limits the reducer enforces, for UIs that size their lists.
#[wasm_bindgen(js_name = displayLimits)]
pub fn display_limits() -> Result<JsValue, JsValue> {
    let limits = serde_json::json!({
        "maxDisplayed": MAX_DISPLAYED_TOKENS,
        "maxQueued": MAX_DISPLAYED_TOKENS * QUEUE_BOUND_FACTOR,
        "dripIntervalMs": DRIP_INTERVAL_MS,
    });
    serde_wasm_bindgen::to_value(&limits)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize limits: {}", e)))
}
