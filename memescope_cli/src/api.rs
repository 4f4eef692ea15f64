use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, error, info};
use memescope_core::{native::FeedService, CoreError};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

#[derive(Clone)]
pub struct FeedState {
    pub service: Arc<FeedService>,
    pub keep_alive: Duration,
}

/// Handler error rendered as `{status: "error", message}`.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("API request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": self.0.to_string()
            })),
        )
            .into_response()
    }
}

/// Routes every enabled feed under its own prefix plus `/health`.
pub fn create_router(feeds: &[Arc<FeedService>], keep_alive: Duration) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));
    for service in feeds {
        let prefix = service.kind().route_prefix();
        let feed_router = Router::new()
            .route(prefix, get(snapshot_handler))
            .route(&format!("{}/stream", prefix), get(stream_handler))
            .route(&format!("{}/status", prefix), get(status_handler))
            .route(&format!("{}/start", prefix), post(start_handler))
            .route(&format!("{}/stop", prefix), post(stop_handler))
            .route(&format!("{}/clear", prefix), post(clear_handler))
            .with_state(FeedState {
                service: service.clone(),
                keep_alive,
            });
        router = router.merge(feed_router);
    }
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn snapshot_handler(State(state): State<FeedState>) -> Result<Response, ApiError> {
    let snapshot = state.service.snapshot().await?;
    Ok(Json(&*snapshot).into_response())
}

async fn stream_handler(State(state): State<FeedState>) -> impl IntoResponse {
    let subscription = state.service.subscribe();
    debug!("{} stream subscriber {} connected", state.service.kind(), subscription.id());
    let events = subscription.map(|event| {
        Ok::<Event, Infallible>(Event::default().event(event.kind.as_str()).data(&*event.data))
    });
    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive));
    ([(X_ACCEL_BUFFERING, "no")], sse)
}

async fn status_handler(State(state): State<FeedState>) -> Result<Response, ApiError> {
    let status = state.service.status().await?;
    Ok(Json(status).into_response())
}

async fn start_handler(State(state): State<FeedState>) -> impl IntoResponse {
    let started = state.service.start();
    if started {
        info!("{} polling started via API", state.service.kind());
    }
    Json(json!({
        "status": "success",
        "running": true,
        "message": if started { "Polling started" } else { "Polling already running" }
    }))
}

async fn stop_handler(State(state): State<FeedState>) -> impl IntoResponse {
    let stopped = state.service.stop();
    if stopped {
        info!("{} polling stopped via API", state.service.kind());
    }
    Json(json!({
        "status": "success",
        "running": false,
        "message": if stopped { "Polling stopped" } else { "Polling was not running" }
    }))
}

async fn clear_handler(State(state): State<FeedState>) -> Result<Response, ApiError> {
    let snapshot = state.service.clear().await?;
    let snapshot = serde_json::to_value(&*snapshot).map_err(CoreError::from)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Snapshot cleared",
        "snapshot": snapshot
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use memescope_core::settings::FeedSettings;
    use memescope_core::{FeedKind, FetchResult, UpstreamFetcher};
    use serde_json::Value;
    use tower::ServiceExt;

    struct StaticFetcher(Value);

    #[async_trait]
    impl UpstreamFetcher for StaticFetcher {
        async fn fetch(&self) -> FetchResult {
            FetchResult::Success(self.0.clone())
        }
    }

    fn feed_with(kind: FeedKind, payload: Value) -> Arc<FeedService> {
        let settings = FeedSettings {
            poll_interval_ms: 60_000,
            ..FeedSettings::default()
        };
        FeedService::new(kind, &settings, Arc::new(StaticFetcher(payload)), 8).unwrap()
    }

    fn feed(kind: FeedKind) -> Arc<FeedService> {
        feed_with(
            kind,
            json!([
                { "id": "m1", "symbol": "AAA" },
                { "id": "m2", "symbol": "BBB" }
            ]),
        )
    }

    async fn call(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = create_router(&[], Duration::from_secs(15));
        let (status, body) = call(&router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn snapshot_is_empty_before_first_poll() {
        let router = create_router(&[feed(FeedKind::JupiterRecent)], Duration::from_secs(15));
        let (status, body) = call(&router, "GET", "/api/jupiter/recent").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "tokens": [], "fetchedAt": null }));
    }

    #[tokio::test]
    async fn snapshot_reflects_polls_and_clear() {
        let gmgn = feed_with(
            FeedKind::Gmgn,
            json!({ "code": 0, "data": { "rank": [{ "address": "g1", "symbol": "GGG" }] } }),
        );
        gmgn.poll_once().await;
        let router = create_router(&[gmgn], Duration::from_secs(15));

        let (_, body) = call(&router, "GET", "/api/gmgn/tokens").await;
        assert_eq!(body["tokens"][0]["id"], "g1");
        assert!(body["fetchedAt"].is_string());

        let (_, body) = call(&router, "GET", "/api/gmgn/tokens/status").await;
        assert_eq!(body["feed"], "gmgn");
        assert_eq!(body["policy"], "merge");
        assert_eq!(body["running"], false);
        assert_eq!(body["tokenCount"], 1);

        let (status, body) = call(&router, "POST", "/api/gmgn/tokens/clear").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot"]["fetchedAt"], Value::Null);
        assert_eq!(body["snapshot"]["tokens"], json!([]));
    }

    #[tokio::test]
    async fn start_is_a_noop_when_running_and_stop_keeps_data() {
        let service = feed(FeedKind::JupiterRecent);
        let router = create_router(&[service.clone()], Duration::from_secs(15));

        let (_, first) = call(&router, "POST", "/api/jupiter/recent/start").await;
        assert_eq!(first["message"], "Polling started");
        let (_, second) = call(&router, "POST", "/api/jupiter/recent/start").await;
        assert_eq!(second["message"], "Polling already running");

        for _ in 0..100 {
            if service.snapshot().await.unwrap().has_data() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (_, stopped) = call(&router, "POST", "/api/jupiter/recent/stop").await;
        assert_eq!(stopped["running"], false);
        let (_, body) = call(&router, "GET", "/api/jupiter/recent").await;
        assert_eq!(body["tokens"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_opens_with_init_event() {
        let service = feed(FeedKind::JupiterTopTrending);
        service.poll_once().await;
        let router = create_router(&[service], Duration::from_secs(15));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/jupiter/top-trending/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["x-accel-buffering"], "no");

        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("event:"));
        assert!(text.contains("init"));
        assert!(text.contains("\"timeframe\":\"1h\""));
        assert!(text.contains("\"id\":\"m2\""));
    }

    #[tokio::test]
    async fn disabled_feeds_are_not_routed() {
        let router = create_router(&[feed(FeedKind::JupiterRecent)], Duration::from_secs(15));
        let (status, _) = call(&router, "GET", "/api/gmgn/tokens").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
