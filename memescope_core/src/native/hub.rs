// Fan-out of serialized snapshots to stream subscribers.
//
// Each subscriber owns a bounded channel. A publish serializes once and uses
// try_send for every subscriber under one lock, so registration (with its
// init event) can never interleave with a publish. A full or closed channel
// removes that subscriber only.

use crate::error::CoreError;
use crate::models::{FeedKind, Snapshot};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubEventKind {
    Init,
    Update,
}

impl HubEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubEventKind::Init => "init",
            HubEventKind::Update => "update",
        }
    }
}

/// One SSE event; `data` is shared by every subscriber of a publish.
#[derive(Debug, Clone)]
pub struct HubEvent {
    pub kind: HubEventKind,
    pub data: Arc<str>,
}

/// Result of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    /// True when an older version arrived after a newer one and was ignored.
    pub superseded: bool,
}

struct Subscriber {
    sender: mpsc::Sender<HubEvent>,
    connected_at: DateTime<Utc>,
}

struct HubState {
    latest: Arc<str>,
    latest_version: u64,
    subscribers: HashMap<u64, Subscriber>,
}

pub struct BroadcastHub {
    feed: FeedKind,
    buffer: usize,
    next_id: AtomicU64,
    state: Mutex<HubState>,
}

impl BroadcastHub {
    pub fn new(feed: FeedKind, buffer: usize, initial: &Snapshot) -> Result<Arc<Self>, CoreError> {
        let latest: Arc<str> = serde_json::to_string(initial)?.into();
        Ok(Arc::new(Self {
            feed,
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            state: Mutex::new(HubState {
                latest,
                latest_version: initial.version,
                subscribers: HashMap::new(),
            }),
        }))
    }

    /// Register a subscriber. The returned stream yields `init` with the
    /// latest payload first, then every later `update`.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        // Capacity is at least one and the channel is fresh.
        let _ = sender.try_send(HubEvent {
            kind: HubEventKind::Init,
            data: state.latest.clone(),
        });
        state.subscribers.insert(
            id,
            Subscriber {
                sender,
                connected_at: Utc::now(),
            },
        );
        info!(
            "{} stream subscriber {} connected ({} total)",
            self.feed,
            id,
            state.subscribers.len()
        );
        Subscription {
            id,
            receiver,
            hub: Arc::clone(self),
        }
    }

    /// Serialize once and fan out an `update`. Snapshots older than the last
    /// published one are ignored.
    pub fn publish(&self, snapshot: &Snapshot) -> Result<PublishReport, CoreError> {
        let payload: Arc<str> = serde_json::to_string(snapshot)?.into();
        let mut state = self.lock();
        if snapshot.version < state.latest_version {
            debug!(
                "{} publish of version {} superseded by {}",
                self.feed, snapshot.version, state.latest_version
            );
            return Ok(PublishReport {
                superseded: true,
                ..PublishReport::default()
            });
        }
        state.latest = payload.clone();
        state.latest_version = snapshot.version;

        let mut report = PublishReport::default();
        let mut failed = Vec::new();
        for (id, subscriber) in state.subscribers.iter() {
            let event = HubEvent {
                kind: HubEventKind::Update,
                data: payload.clone(),
            };
            match subscriber.sender.try_send(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("{} dropping stream subscriber {}: {}", self.feed, id, e);
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            state.subscribers.remove(&id);
            report.dropped += 1;
        }
        Ok(report)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Oldest connection time among current subscribers.
    pub fn oldest_connection(&self) -> Option<DateTime<Utc>> {
        self.lock().subscribers.values().map(|s| s.connected_at).min()
    }

    pub fn latest_payload(&self) -> Arc<str> {
        self.lock().latest.clone()
    }

    fn remove(&self, id: u64) {
        let mut state = self.lock();
        if state.subscribers.remove(&id).is_some() {
            info!(
                "{} stream subscriber {} disconnected ({} remaining)",
                self.feed,
                id,
                state.subscribers.len()
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Event stream for one subscriber; deregisters itself when dropped.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<HubEvent>,
    hub: Arc<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = HubEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(self.id);
    }
}
