// In-memory snapshot of one feed.
// Every mutation builds a fresh Snapshot and swaps the Arc, so a reader
// holding a previous Arc never observes a half-applied update.

use crate::models::{MergePolicy, Snapshot, TokenRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub policy: MergePolicy,
    pub max_tokens: usize,
    /// Echoed into every snapshot (top-trending only).
    pub timeframe: Option<String>,
    pub limit: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::Replace,
            max_tokens: 1_000,
            timeframe: None,
            limit: None,
        }
    }
}

pub struct SnapshotStore {
    config: StoreConfig,
    current: Arc<Snapshot>,
}

impl SnapshotStore {
    pub fn new(config: StoreConfig) -> Self {
        let current = Arc::new(Snapshot {
            timeframe: config.timeframe.clone(),
            limit: config.limit,
            ..Snapshot::default()
        });
        Self { config, current }
    }

    pub fn policy(&self) -> MergePolicy {
        self.config.policy
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.clone()
    }

    /// Fold a successful poll into the snapshot and clear any error.
    pub fn apply_result(&mut self, incoming: Vec<TokenRecord>) -> Arc<Snapshot> {
        self.apply_result_at(incoming, Utc::now())
    }

    pub fn apply_result_at(
        &mut self,
        incoming: Vec<TokenRecord>,
        now: DateTime<Utc>,
    ) -> Arc<Snapshot> {
        let tokens = match self.config.policy {
            MergePolicy::Replace => dedup_by_id(incoming),
            MergePolicy::Merge => merge_by_id(&self.current.tokens, incoming),
        };
        let tokens = cap_oldest_first(tokens, self.config.max_tokens, self.config.policy);
        self.swap(Snapshot {
            tokens,
            fetched_at: Some(now),
            error: None,
            ..self.base()
        })
    }

    /// Record a failed poll. Tokens and fetchedAt stay as they were.
    pub fn apply_failure(&mut self, message: impl Into<String>) -> Arc<Snapshot> {
        let previous = self.current.clone();
        self.swap(Snapshot {
            tokens: previous.tokens.clone(),
            fetched_at: previous.fetched_at,
            error: Some(message.into()),
            ..self.base()
        })
    }

    /// Drop all data; the feed reads as "no data yet" afterwards.
    pub fn clear(&mut self) -> Arc<Snapshot> {
        self.swap(self.base())
    }

    fn base(&self) -> Snapshot {
        Snapshot {
            timeframe: self.config.timeframe.clone(),
            limit: self.config.limit,
            ..Snapshot::default()
        }
    }

    fn swap(&mut self, mut next: Snapshot) -> Arc<Snapshot> {
        next.version = self.current.version + 1;
        self.current = Arc::new(next);
        self.current.clone()
    }
}

/// First occurrence keeps its position; later duplicates merge into it.
fn dedup_by_id(incoming: Vec<TokenRecord>) -> Vec<TokenRecord> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(incoming.len());
    let mut out: Vec<TokenRecord> = Vec::with_capacity(incoming.len());
    for token in incoming {
        match index.get(&token.id) {
            Some(&pos) => out[pos].merge_from(&token),
            None => {
                index.insert(token.id.clone(), out.len());
                out.push(token);
            }
        }
    }
    out
}

/// Update known ids in place, append unknown ones in arrival order.
fn merge_by_id(previous: &[TokenRecord], incoming: Vec<TokenRecord>) -> Vec<TokenRecord> {
    let mut out: Vec<TokenRecord> = previous.to_vec();
    let mut index: HashMap<String, usize> = out
        .iter()
        .enumerate()
        .map(|(pos, token)| (token.id.clone(), pos))
        .collect();
    for token in incoming {
        match index.get(&token.id) {
            Some(&pos) => out[pos].merge_from(&token),
            None => {
                index.insert(token.id.clone(), out.len());
                out.push(token);
            }
        }
    }
    out
}

// Merge feeds hold oldest entries at the front; replace feeds are ordered by
// the provider, so the tail is dropped instead.
fn cap_oldest_first(
    mut tokens: Vec<TokenRecord>,
    max: usize,
    policy: MergePolicy,
) -> Vec<TokenRecord> {
    if tokens.len() > max {
        match policy {
            MergePolicy::Merge => {
                let excess = tokens.len() - max;
                tokens.drain(0..excess);
            }
            MergePolicy::Replace => tokens.truncate(max),
        }
    }
    tokens
}
