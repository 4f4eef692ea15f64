// Browser feed subscription - EventSource + drip timer around the core reducer
use log::{debug, error, info, warn};
use memescope_core::reducer::{FeedReducer, DRIP_INTERVAL_MS};
use memescope_core::storage_trait::{keys, StorageBackend};
use memescope_core::symbol_cache::{SymbolCache, SYMBOL_CACHE_CAPACITY};
use memescope_core::wasm::LocalStorageBackend;
use memescope_core::FeedKind;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventSource, MessageEvent};

struct SubscriptionState {
    /// Closed synchronously by `close()`; merges and drips are no-ops afterwards.
    reducer: FeedReducer,
    on_change: js_sys::Function,
    on_error: Option<js_sys::Function>,
}

type Shared = Arc<Mutex<SubscriptionState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SubscriptionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Live view of one feed for a UI component.
///
/// `onChange` receives `{ phase, visible, queued, fetchedAt, error, stale }`
/// after every merge and drip; `onError` receives a message string for
/// malformed payloads and connection errors. The browser's own EventSource
/// retry handles reconnects, and the server answers each one with a fresh `init`.
#[wasm_bindgen]
pub struct FeedSubscription {
    state: Shared,
    source: EventSource,
    interval_id: Option<i32>,
    _on_init: Closure<dyn FnMut(MessageEvent)>,
    _on_update: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
    _on_drip: Closure<dyn FnMut()>,
}

#[wasm_bindgen]
impl FeedSubscription {
    /// Open `{base_url}{feed prefix}/stream`; `feed` is one of
    /// `jupiter_recent`, `jupiter_top_trending`, `gmgn`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        base_url: &str,
        feed: &str,
        on_change: js_sys::Function,
        on_error: Option<js_sys::Function>,
    ) -> Result<FeedSubscription, JsValue> {
        let kind = FeedKind::from_slug(feed)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown feed: {}", feed)))?;
        let url = format!("{}{}", base_url.trim_end_matches('/'), kind.stream_path());
        let cache_key = keys::symbol_cache(kind.slug());

        let state: Shared = Arc::new(Mutex::new(SubscriptionState {
            reducer: FeedReducer::new(),
            on_change,
            on_error,
        }));
        restore_symbols(state.clone(), cache_key.clone());

        let source = EventSource::new(&url)
            .map_err(|e| JsValue::from_str(&format!("Failed to open EventSource: {:?}", e)))?;

        let on_init = payload_listener(state.clone(), cache_key.clone());
        let on_update = payload_listener(state.clone(), cache_key);
        source.add_event_listener_with_callback("init", on_init.as_ref().unchecked_ref())?;
        source.add_event_listener_with_callback("update", on_update.as_ref().unchecked_ref())?;

        let state_for_error = state.clone();
        let source_for_error = source.clone();
        let on_error_cb = Closure::wrap(Box::new(move |_e: Event| {
            let message = if source_for_error.ready_state() == EventSource::CLOSED {
                "Stream closed"
            } else {
                "Stream connection error, retrying"
            };
            warn!("{}: {}", source_for_error.url(), message);
            report_error(&state_for_error, message);
        }) as Box<dyn FnMut(Event)>);
        source.add_event_listener_with_callback("error", on_error_cb.as_ref().unchecked_ref())?;

        let state_for_drip = state.clone();
        let on_drip = Closure::wrap(Box::new(move || {
            let view = {
                let mut guard = lock(&state_for_drip);
                if guard.reducer.drip_tick().is_none() {
                    return;
                }
                render(&guard)
            };
            emit_change(&state_for_drip, view);
        }) as Box<dyn FnMut()>);

        let interval_id = web_sys::window()
            .ok_or_else(|| JsValue::from_str("No window object available"))?
            .set_interval_with_callback_and_timeout_and_arguments_0(
                on_drip.as_ref().unchecked_ref(),
                DRIP_INTERVAL_MS as i32,
            )?;

        info!("Subscribed to {}", url);
        Ok(Self {
            state,
            source,
            interval_id: Some(interval_id),
            _on_init: on_init,
            _on_update: on_update,
            _on_error: on_error_cb,
            _on_drip: on_drip,
        })
    }

    /// Stop the stream and the drip timer. Later callbacks are no-ops.
    pub fn close(&mut self) {
        {
            let mut guard = lock(&self.state);
            if guard.reducer.is_closed() {
                return;
            }
            guard.reducer.close();
        }
        self.source.close();
        if let (Some(window), Some(id)) = (web_sys::window(), self.interval_id.take()) {
            window.clear_interval_with_handle(id);
        }
        info!("Closed {}", self.source.url());
    }

    #[wasm_bindgen(js_name = isClosed)]
    pub fn is_closed(&self) -> bool {
        lock(&self.state).reducer.is_closed()
    }

    /// Current `{ phase, visible, queued, ... }` view.
    pub fn view(&self) -> Result<JsValue, JsValue> {
        render(&lock(&self.state))
    }

    #[wasm_bindgen(js_name = queuedCount)]
    pub fn queued_count(&self) -> usize {
        lock(&self.state).reducer.queued().len()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn payload_listener(state: Shared, cache_key: String) -> Closure<dyn FnMut(MessageEvent)> {
    Closure::wrap(Box::new(move |event: MessageEvent| {
        let Some(payload) = event.data().as_string() else {
            report_error(&state, "Stream event without text payload");
            return;
        };
        let outcome = {
            let mut guard = lock(&state);
            if guard.reducer.is_closed() {
                return;
            }
            match guard.reducer.apply_payload(&payload) {
                Ok(merge) => {
                    debug!("{} updated, {} queued", merge.updated, merge.queued);
                    let dirty = guard.reducer.symbols_mut().take_dirty_entries();
                    Ok((render(&guard), dirty))
                }
                Err(e) => Err(e.to_string()),
            }
        };
        match outcome {
            Ok((view, dirty)) => {
                emit_change(&state, view);
                if let Some(entries) = dirty {
                    let key = cache_key.clone();
                    wasm_bindgen_futures::spawn_local(async move {
                        let storage = LocalStorageBackend::default_instance();
                        if let Err(e) = storage.save(&key, &entries).await {
                            warn!("Failed to persist symbol cache: {}", e);
                        }
                    });
                }
            }
            Err(message) => {
                error!("{}", message);
                report_error(&state, &message);
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>)
}

/// Load persisted symbols and fold anything learned meanwhile on top.
fn restore_symbols(state: Shared, cache_key: String) {
    wasm_bindgen_futures::spawn_local(async move {
        let storage = LocalStorageBackend::default_instance();
        match SymbolCache::load(&storage, &cache_key, SYMBOL_CACHE_CAPACITY).await {
            Ok(mut loaded) => {
                let mut guard = lock(&state);
                loaded.extend_from(guard.reducer.symbols_mut());
                *guard.reducer.symbols_mut() = loaded;
            }
            Err(e) => warn!("Ignoring unreadable symbol cache: {}", e),
        }
    });
}

fn render(state: &SubscriptionState) -> Result<JsValue, JsValue> {
    state
        .reducer
        .view()
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize view: {}", e)))
}

// Callbacks run with the lock released so they may call back into the subscription.
fn emit_change(state: &Shared, view: Result<JsValue, JsValue>) {
    let callback = {
        let guard = lock(state);
        if guard.reducer.is_closed() {
            return;
        }
        guard.on_change.clone()
    };
    match view {
        Ok(view) => {
            if let Err(e) = callback.call1(&JsValue::NULL, &view) {
                error!("onChange callback threw: {:?}", e);
            }
        }
        Err(e) => error!("{:?}", e),
    }
}

fn report_error(state: &Shared, message: &str) {
    let callback = {
        let guard = lock(state);
        if guard.reducer.is_closed() {
            return;
        }
        guard.on_error.clone()
    };
    if let Some(callback) = callback {
        if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(message)) {
            error!("onError callback threw: {:?}", e);
        }
    }
}
