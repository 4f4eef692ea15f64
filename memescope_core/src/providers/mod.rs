// Provider-specific request building and payload normalization

pub mod coerce;
mod gmgn;
mod jupiter;

pub use gmgn::normalize_gmgn;
pub use jupiter::normalize_jupiter;

use crate::error::CoreError;
use crate::models::{FeedKind, TokenRecord};
use crate::settings::FeedSettings;
use serde_json::Value;
use url::Url;

/// Normalize a raw upstream payload for the given feed.
pub fn normalize(kind: FeedKind, raw: &Value) -> Result<Vec<TokenRecord>, CoreError> {
    match kind {
        FeedKind::JupiterRecent | FeedKind::JupiterTopTrending => normalize_jupiter(raw),
        FeedKind::Gmgn => normalize_gmgn(raw),
    }
}

/// Build the upstream URL polled on every tick.
///
/// Top-trending appends the timeframe as a path segment and `limit` as a
/// query parameter; GMGN only takes `limit`.
pub fn build_url(kind: FeedKind, feed: &FeedSettings) -> Result<Url, CoreError> {
    let base = feed.url_for(kind);
    let mut url = Url::parse(&base)
        .map_err(|e| CoreError::Validation(format!("Invalid {} url '{}': {}", kind, base, e)))?;

    if let Some(timeframe) = feed
        .timeframe_for(kind)
        .filter(|_| kind == FeedKind::JupiterTopTrending)
    {
        url.path_segments_mut()
            .map_err(|_| CoreError::Validation(format!("{} url cannot be a base", kind)))?
            .pop_if_empty()
            .push(&timeframe);
    }
    if let Some(limit) = feed.limit_for(kind) {
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
    }
    Ok(url)
}
