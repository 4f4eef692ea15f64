// One independent poll -> store -> broadcast pipeline per feed.

use crate::error::CoreError;
use crate::fetcher::{FetchResult, UpstreamFetcher};
use crate::metrics::{FeedMetrics, MetricsSnapshot};
use crate::models::{FeedKind, MergePolicy, Snapshot};
use crate::native::http::HttpFetcher;
use crate::native::hub::{BroadcastHub, Subscription};
use crate::native::store_actor::StoreHandle;
use crate::providers;
use crate::settings::{FeedSettings, Settings};
use crate::snapshot_store::{SnapshotStore, StoreConfig};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Payload applied; carries the resulting token count.
    Updated(usize),
    /// Failure recorded into the snapshot.
    Failed(String),
    /// A previous poll was still in flight.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub feed: &'static str,
    pub running: bool,
    pub policy: MergePolicy,
    pub poll_interval_ms: u64,
    pub token_count: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stale: bool,
    pub subscribers: usize,
    /// Connection time of the longest-lived stream subscriber.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_subscriber_since: Option<DateTime<Utc>>,
    pub metrics: MetricsSnapshot,
}

/// Clears the in-flight flag when dropped, including when the poll task is aborted.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedService {
    kind: FeedKind,
    policy: MergePolicy,
    poll_interval: Duration,
    fetcher: Arc<dyn UpstreamFetcher>,
    store: StoreHandle,
    hub: Arc<BroadcastHub>,
    metrics: FeedMetrics,
    in_flight: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl FeedService {
    /// Build a service around any fetcher. Must be called inside a tokio runtime.
    pub fn new(
        kind: FeedKind,
        settings: &FeedSettings,
        fetcher: Arc<dyn UpstreamFetcher>,
        stream_buffer: usize,
    ) -> Result<Arc<Self>, CoreError> {
        let policy = settings.policy_for(kind);
        let store = SnapshotStore::new(StoreConfig {
            policy,
            max_tokens: settings.max_tokens,
            timeframe: settings
                .timeframe_for(kind)
                .filter(|_| kind == FeedKind::JupiterTopTrending),
            limit: settings
                .limit_for(kind)
                .filter(|_| kind == FeedKind::JupiterTopTrending),
        });
        let hub = BroadcastHub::new(kind, stream_buffer, &store.snapshot())?;
        Ok(Arc::new(Self {
            kind,
            policy,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            fetcher,
            store: StoreHandle::spawn(kind, store),
            hub,
            metrics: FeedMetrics::new(),
            in_flight: AtomicBool::new(false),
            poller: Mutex::new(None),
        }))
    }

    /// Build the HTTP-backed service described by the settings file.
    pub fn from_settings(kind: FeedKind, settings: &Settings) -> Result<Arc<Self>, CoreError> {
        let feed = settings.feeds.get(kind);
        let fetcher = HttpFetcher::new(kind, feed)?;
        info!("{} polls {} every {} ms", kind, fetcher.url(), feed.poll_interval_ms);
        Self::new(kind, feed, Arc::new(fetcher), settings.server.stream_buffer)
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Start the poll loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut poller = self.lock_poller();
        if poller.as_ref().map_or(false, |handle| !handle.is_finished()) {
            debug!("{} poller already running", self.kind);
            return false;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.poll_interval;
        *poller = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(service) = weak.upgrade() else {
                    break;
                };
                service.poll_once().await;
            }
        }));
        info!("{} poller started ({} ms)", self.kind, period.as_millis());
        true
    }

    /// Stop the poll loop. The snapshot stays readable. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        match self.lock_poller().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                info!("{} poller stopped", self.kind);
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_poller()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Run one fetch/normalize/apply/notify cycle.
    pub async fn poll_once(&self) -> PollOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            self.metrics.record_skipped();
            debug!("{} tick skipped, previous poll still in flight", self.kind);
            return PollOutcome::Skipped;
        };
        self.metrics.record_started();

        let normalized = match self.fetcher.fetch().await {
            FetchResult::Success(raw) => {
                providers::normalize(self.kind, &raw).map_err(|e| e.to_string())
            }
            FetchResult::Failed(message) => Err(message),
        };

        match normalized {
            Ok(tokens) => {
                let received = tokens.len();
                match self.store.apply_result(tokens).await {
                    Ok(snapshot) => {
                        self.metrics.record_success();
                        debug!(
                            "{} applied {} tokens ({} held)",
                            self.kind,
                            received,
                            snapshot.tokens.len()
                        );
                        self.notify(&snapshot);
                        PollOutcome::Updated(snapshot.tokens.len())
                    }
                    Err(e) => {
                        self.metrics.record_failure();
                        error!("{} could not apply poll result: {}", self.kind, e);
                        PollOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(message) => {
                self.metrics.record_failure();
                warn!("{} poll failed: {}", self.kind, message);
                match self.store.apply_failure(message.clone()).await {
                    Ok(snapshot) => self.notify(&snapshot),
                    Err(e) => error!("{} could not record poll failure: {}", self.kind, e),
                }
                PollOutcome::Failed(message)
            }
        }
    }

    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, CoreError> {
        self.store.snapshot().await
    }

    /// Empty the snapshot and push the empty state to subscribers.
    pub async fn clear(&self) -> Result<Arc<Snapshot>, CoreError> {
        let snapshot = self.store.clear().await?;
        info!("{} snapshot cleared", self.kind);
        self.notify(&snapshot);
        Ok(snapshot)
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        self.hub.subscribe()
    }

    pub async fn status(&self) -> Result<FeedStatus, CoreError> {
        let snapshot = self.snapshot().await?;
        Ok(FeedStatus {
            feed: self.kind.slug(),
            running: self.is_running(),
            policy: self.policy,
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            token_count: snapshot.tokens.len(),
            fetched_at: snapshot.fetched_at,
            error: snapshot.error.clone(),
            stale: snapshot.is_stale(),
            subscribers: self.hub.subscriber_count(),
            oldest_subscriber_since: self.hub.oldest_connection(),
            metrics: self.metrics.snapshot(),
        })
    }

    fn notify(&self, snapshot: &Snapshot) {
        match self.hub.publish(snapshot) {
            Ok(report) if !report.superseded => self.metrics.record_broadcast(report.dropped),
            Ok(_) => {}
            Err(e) => error!("{} failed to serialize snapshot: {}", self.kind, e),
        }
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FeedService {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_poller().take() {
            handle.abort();
        }
    }
}
