// Terminal consumer of a feed stream: SSE decode -> reducer -> 1 s drip.

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use memescope_core::error::CoreError;
use memescope_core::native::FileStorage;
use memescope_core::reducer::{FeedReducer, DRIP_INTERVAL_MS};
use memescope_core::sse::{SseDecoder, SseEvent};
use memescope_core::storage_trait::keys;
use memescope_core::symbol_cache::{SymbolCache, SYMBOL_CACHE_CAPACITY};
use memescope_core::{FeedKind, Settings, TokenRecord};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use url::Url;

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub async fn run(settings: &Settings, feed: &str, base_url: Option<&str>) -> Result<(), CoreError> {
    let kind = FeedKind::from_slug(feed).ok_or_else(|| {
        let known: Vec<&str> = FeedKind::ALL.iter().map(|k| k.slug()).collect();
        CoreError::Validation(format!("unknown feed '{}', expected one of {:?}", feed, known))
    })?;
    let url = stream_url(base_url.unwrap_or(&settings.watch.base_url), kind)?;
    stream_feed(kind, url, &settings.watch.storage_dir, tokio::signal::ctrl_c()).await
}

/// Consume the feed until `shutdown` resolves, reconnecting on errors.
async fn stream_feed<F: Future>(
    kind: FeedKind,
    url: Url,
    storage_dir: &str,
    shutdown: F,
) -> Result<(), CoreError> {
    let storage = FileStorage::new(storage_dir);
    let cache_key = keys::symbol_cache(kind.slug());
    let symbols = match SymbolCache::load(&storage, &cache_key, SYMBOL_CACHE_CAPACITY).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Ignoring unreadable symbol cache: {}", e);
            SymbolCache::default()
        }
    };
    let mut reducer = FeedReducer::with_symbol_cache(symbols);

    let client = reqwest::Client::new();
    let mut drip = tokio::time::interval(Duration::from_millis(u64::from(DRIP_INTERVAL_MS)));
    drip.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        info!("Connecting to {}", url);
        let request = client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send();
        let connected = tokio::select! {
            _ = &mut shutdown => {
                persist(&mut reducer, &storage, &cache_key).await;
                return Ok(());
            }
            result = request => result.and_then(|response| response.error_for_status()),
        };

        match connected {
            Ok(response) => {
                let body = response.bytes_stream();
                tokio::pin!(body);
                let mut decoder = SseDecoder::new();
                loop {
                    tokio::select! {
                        _ = &mut shutdown => {
                            persist(&mut reducer, &storage, &cache_key).await;
                            return Ok(());
                        }
                        chunk = body.next() => match chunk {
                            Some(Ok(bytes)) => {
                                for event in decoder.push(&bytes) {
                                    handle_event(&mut reducer, &event);
                                }
                            }
                            Some(Err(e)) => {
                                warn!("Stream error: {}", e);
                                break;
                            }
                            None => {
                                warn!("Stream closed by server");
                                break;
                            }
                        },
                        _ = drip.tick() => {
                            if let Some(id) = reducer.drip_tick() {
                                if let Some(token) = reducer.visible().iter().find(|t| t.id == id) {
                                    println!("{}", render(token));
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => warn!("Could not open stream: {}", e),
        }

        persist(&mut reducer, &storage, &cache_key).await;
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

fn stream_url(base: &str, kind: FeedKind) -> Result<Url, CoreError> {
    Url::parse(base)
        .and_then(|url| url.join(&kind.stream_path()))
        .map_err(|e| CoreError::Validation(format!("invalid base url '{}': {}", base, e)))
}

fn handle_event(reducer: &mut FeedReducer, event: &SseEvent) {
    match event.event.as_str() {
        "init" | "update" => match reducer.apply_payload(&event.data) {
            Ok(outcome) => {
                debug!(
                    "{}: {} updated, {} queued, {} dropped from queue",
                    event.event, outcome.updated, outcome.queued, outcome.overflowed
                );
                if let Some(message) = reducer.error() {
                    println!("! upstream error, showing stale data: {}", message);
                }
            }
            // State is left as it was; the stream stays open.
            Err(e) => error!("{}", e),
        },
        other => debug!("Ignoring '{}' event", other),
    }
}

fn render(token: &TokenRecord) -> String {
    let symbol = if token.symbol.is_empty() { "?" } else { token.symbol.as_str() };
    let price = token
        .usd_price
        .map(|p| format!("${:.8}", p))
        .unwrap_or_else(|| "-".to_string());
    let mcap = token
        .mcap
        .map(|m| format!("${:.0}", m))
        .unwrap_or_else(|| "-".to_string());
    format!("+ {:<12} {:<16} mcap {:<14} {}", symbol, price, mcap, token.id)
}

async fn persist(reducer: &mut FeedReducer, storage: &FileStorage, key: &str) {
    match reducer.symbols_mut().persist(storage, key).await {
        Ok(true) => debug!("Symbol cache saved"),
        Ok(false) => {}
        Err(e) => warn!("Failed to save symbol cache: {}", e),
    }
}
