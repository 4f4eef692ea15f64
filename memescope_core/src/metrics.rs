// Per-feed poll and broadcast counters
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks poll scheduler activity for one feed
#[derive(Debug)]
pub struct FeedMetrics {
    /// Poll ticks that actually issued an upstream request
    pub polls_started: AtomicU64,
    /// Polls whose payload was applied to the snapshot
    pub polls_succeeded: AtomicU64,
    /// Polls recorded as failures (network, status, malformed body)
    pub polls_failed: AtomicU64,
    /// Ticks dropped because the previous poll was still in flight
    pub ticks_skipped: AtomicU64,
    /// Snapshot publications fanned out to subscribers
    pub broadcasts: AtomicU64,
    /// Subscribers removed after a failed write
    pub dropped_subscribers: AtomicU64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            polls_started: AtomicU64::new(0),
            polls_succeeded: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            dropped_subscribers: AtomicU64::new(0),
        }
    }

    pub fn record_started(&self) {
        self.polls_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.polls_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, dropped: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.dropped_subscribers
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_started: self.polls_started.load(Ordering::Relaxed),
            polls_succeeded: self.polls_succeeded.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            dropped_subscribers: self.dropped_subscribers.load(Ordering::Relaxed),
        }
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of feed metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub polls_started: u64,
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub ticks_skipped: u64,
    pub broadcasts: u64,
    pub dropped_subscribers: u64,
}

impl MetricsSnapshot {
    pub fn failure_rate_percent(&self) -> f64 {
        if self.polls_started == 0 {
            return 0.0;
        }
        (self.polls_failed as f64 / self.polls_started as f64) * 100.0
    }
}
