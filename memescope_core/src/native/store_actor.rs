// Single-writer task owning a feed's SnapshotStore.
// Readers and the poll loop talk to it over a request channel.

use crate::error::CoreError;
use crate::models::{FeedKind, Snapshot, TokenRecord};
use crate::snapshot_store::SnapshotStore;
use log::debug;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const STORE_CHANNEL_CAPACITY: usize = 64;

pub enum StoreRequest {
    Get {
        resp: oneshot::Sender<Arc<Snapshot>>,
    },
    ApplyResult {
        tokens: Vec<TokenRecord>,
        resp: oneshot::Sender<Arc<Snapshot>>,
    },
    ApplyFailure {
        message: String,
        resp: oneshot::Sender<Arc<Snapshot>>,
    },
    Clear {
        resp: oneshot::Sender<Arc<Snapshot>>,
    },
}

#[derive(Clone)]
pub struct StoreHandle {
    feed: FeedKind,
    sender: mpsc::Sender<StoreRequest>,
}

impl StoreHandle {
    /// Spawn the actor on the current runtime. It exits once every handle is dropped.
    pub fn spawn(feed: FeedKind, store: SnapshotStore) -> Self {
        let (sender, receiver) = mpsc::channel(STORE_CHANNEL_CAPACITY);
        tokio::spawn(run_store(feed, store, receiver));
        Self { feed, sender }
    }

    /// Handle whose actor is already gone; every request fails with `ActorClosed`.
    #[cfg(test)]
    pub(crate) fn detached(feed: FeedKind) -> Self {
        let (sender, _) = mpsc::channel(1);
        Self { feed, sender }
    }

    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, CoreError> {
        self.request(|resp| StoreRequest::Get { resp }).await
    }

    pub async fn apply_result(&self, tokens: Vec<TokenRecord>) -> Result<Arc<Snapshot>, CoreError> {
        self.request(|resp| StoreRequest::ApplyResult { tokens, resp })
            .await
    }

    pub async fn apply_failure(&self, message: String) -> Result<Arc<Snapshot>, CoreError> {
        self.request(|resp| StoreRequest::ApplyFailure { message, resp })
            .await
    }

    pub async fn clear(&self) -> Result<Arc<Snapshot>, CoreError> {
        self.request(|resp| StoreRequest::Clear { resp }).await
    }

    async fn request<F>(&self, build: F) -> Result<Arc<Snapshot>, CoreError>
    where
        F: FnOnce(oneshot::Sender<Arc<Snapshot>>) -> StoreRequest,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| CoreError::ActorClosed(self.feed.to_string()))?;
        rx.await
            .map_err(|_| CoreError::ActorClosed(self.feed.to_string()))
    }
}

async fn run_store(
    feed: FeedKind,
    mut store: SnapshotStore,
    mut receiver: mpsc::Receiver<StoreRequest>,
) {
    debug!("Snapshot store for {} started ({:?} policy)", feed, store.policy());
    while let Some(request) = receiver.recv().await {
        match request {
            StoreRequest::Get { resp } => {
                let _ = resp.send(store.snapshot());
            }
            StoreRequest::ApplyResult { tokens, resp } => {
                let _ = resp.send(store.apply_result(tokens));
            }
            StoreRequest::ApplyFailure { message, resp } => {
                let _ = resp.send(store.apply_failure(message));
            }
            StoreRequest::Clear { resp } => {
                let _ = resp.send(store.clear());
            }
        }
    }
    debug!("Snapshot store for {} stopped", feed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MergePolicy;
    use crate::snapshot_store::StoreConfig;

    #[tokio::test]
    async fn concurrent_writers_are_serialized() {
        let handle = StoreHandle::spawn(
            FeedKind::Gmgn,
            SnapshotStore::new(StoreConfig {
                policy: MergePolicy::Merge,
                ..StoreConfig::default()
            }),
        );

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .apply_result(vec![TokenRecord::new(format!("m{}", i), "SYM")])
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.tokens.len(), 20);
        assert_eq!(snapshot.version, 20);
    }

    #[tokio::test]
    async fn failure_and_clear_round_trip_through_actor() {
        let handle = StoreHandle::spawn(FeedKind::JupiterRecent, SnapshotStore::new(StoreConfig::default()));
        handle
            .apply_result(vec![TokenRecord::new("A", "AAA")])
            .await
            .unwrap();
        let failed = handle.apply_failure("boom".to_string()).await.unwrap();
        assert_eq!(failed.tokens.len(), 1);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        let cleared = handle.clear().await.unwrap();
        assert!(cleared.tokens.is_empty());
        assert!(cleared.fetched_at.is_none());
    }
}
