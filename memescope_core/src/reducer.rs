// Client-side merge/queue reducer.
//
// Snapshots streamed from a feed never touch the visible list directly once
// it has been seeded: unknown tokens wait in `queued` and are revealed one per
// drip tick. Every id lives in at most one of the two lists.

use crate::error::CoreError;
use crate::models::{Snapshot, TokenRecord};
use crate::symbol_cache::SymbolCache;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;

pub const MAX_DISPLAYED_TOKENS: usize = 200;
pub const QUEUE_BOUND_FACTOR: usize = 3;
pub const DRIP_INTERVAL_MS: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReducerPhase {
    /// No event received yet.
    Uninitialized,
    /// The first event populated `visible`.
    Seeded,
    /// Merge-only from here on.
    Steady,
}

/// What a single merge did, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub updated: usize,
    pub queued: usize,
    pub overflowed: usize,
}

/// Serializable view of the reducer handed to UIs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedView<'a> {
    pub phase: ReducerPhase,
    pub visible: &'a [TokenRecord],
    pub queued: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<&'a str>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<&'a str>,
}

pub struct FeedReducer {
    phase: ReducerPhase,
    visible: Vec<TokenRecord>,
    queued: VecDeque<TokenRecord>,
    max_visible: usize,
    max_queued: usize,
    symbols: SymbolCache,
    fetched_at: Option<DateTime<Utc>>,
    error: Option<String>,
    timeframe: Option<String>,
    closed: bool,
}

impl FeedReducer {
    pub fn new() -> Self {
        Self::with_limits(MAX_DISPLAYED_TOKENS, SymbolCache::default())
    }

    pub fn with_symbol_cache(symbols: SymbolCache) -> Self {
        Self::with_limits(MAX_DISPLAYED_TOKENS, symbols)
    }

    pub fn with_limits(max_visible: usize, symbols: SymbolCache) -> Self {
        let max_visible = max_visible.max(1);
        Self {
            phase: ReducerPhase::Uninitialized,
            visible: Vec::new(),
            queued: VecDeque::new(),
            max_visible,
            max_queued: max_visible * QUEUE_BOUND_FACTOR,
            symbols,
            fetched_at: None,
            error: None,
            timeframe: None,
            closed: false,
        }
    }

    pub fn phase(&self) -> ReducerPhase {
        self.phase
    }

    pub fn visible(&self) -> &[TokenRecord] {
        &self.visible
    }

    pub fn queued(&self) -> &VecDeque<TokenRecord> {
        &self.queued
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_stale(&self) -> bool {
        self.fetched_at.is_some() && self.error.is_some()
    }

    /// Tear down: every later merge and drip is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolCache {
        &mut self.symbols
    }

    pub fn view(&self) -> FeedView<'_> {
        FeedView {
            phase: self.phase,
            visible: &self.visible,
            queued: self.queued.len(),
            fetched_at: self.fetched_at,
            error: self.error.as_deref(),
            stale: self.is_stale(),
            timeframe: self.timeframe.as_deref(),
        }
    }

    /// Parse an `init`/`update` data payload and merge it.
    /// A payload that does not parse leaves the state untouched.
    pub fn apply_payload(&mut self, payload: &str) -> Result<MergeOutcome, CoreError> {
        if self.closed {
            return Ok(MergeOutcome::default());
        }
        let snapshot: Snapshot = serde_json::from_str(payload).map_err(|e| {
            warn!("Discarding malformed feed payload: {}", e);
            CoreError::Parse(format!("Malformed feed payload: {}", e))
        })?;
        Ok(self.apply_snapshot(snapshot))
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> MergeOutcome {
        if self.closed {
            return MergeOutcome::default();
        }
        self.fetched_at = snapshot.fetched_at;
        self.error = snapshot.error;
        self.timeframe = snapshot.timeframe;

        let seeding = self.phase == ReducerPhase::Uninitialized;
        let mut outcome = MergeOutcome::default();
        for mut token in snapshot.tokens {
            if token.id.is_empty() {
                continue;
            }
            self.symbols.observe(&mut token);

            if let Some(existing) = self.visible.iter_mut().find(|t| t.id == token.id) {
                existing.merge_from(&token);
                outcome.updated += 1;
            } else if let Some(existing) = self.queued.iter_mut().find(|t| t.id == token.id) {
                existing.merge_from(&token);
                outcome.updated += 1;
            } else if seeding && self.visible.len() < self.max_visible {
                self.visible.push(token);
            } else {
                self.queued.push_back(token);
                outcome.queued += 1;
                if self.queued.len() > self.max_queued {
                    self.queued.pop_front();
                    outcome.overflowed += 1;
                }
            }
        }

        self.phase = match self.phase {
            ReducerPhase::Uninitialized => ReducerPhase::Seeded,
            _ => ReducerPhase::Steady,
        };
        if outcome.overflowed > 0 {
            debug!("Queue overflow dropped {} oldest entries", outcome.overflowed);
        }
        outcome
    }

    /// Reveal the oldest queued token. Returns its id, or None if the queue was empty.
    pub fn drip_tick(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        let next = self.queued.pop_front()?;
        let id = next.id.clone();
        match self.visible.iter_mut().find(|t| t.id == next.id) {
            Some(existing) => existing.merge_from(&next),
            None => {
                self.visible.insert(0, next);
                self.visible.truncate(self.max_visible);
            }
        }
        Some(id)
    }
}

impl Default for FeedReducer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn token(id: &str, symbol: &str) -> TokenRecord {
        TokenRecord::new(id, symbol)
    }

    fn snapshot(tokens: Vec<TokenRecord>) -> Snapshot {
        Snapshot {
            tokens,
            fetched_at: Some(Utc::now()),
            ..Snapshot::default()
        }
    }

    fn visible_ids(reducer: &FeedReducer) -> Vec<&str> {
        reducer.visible().iter().map(|t| t.id.as_str()).collect()
    }

    fn queued_ids(reducer: &FeedReducer) -> Vec<&str> {
        reducer.queued().iter().map(|t| t.id.as_str()).collect()
    }

    fn assert_disjoint(reducer: &FeedReducer) {
        let visible: HashSet<&str> = visible_ids(reducer).into_iter().collect();
        let queued: HashSet<&str> = queued_ids(reducer).into_iter().collect();
        assert!(visible.is_disjoint(&queued));
        assert_eq!(visible.len(), reducer.visible().len());
        assert_eq!(queued.len(), reducer.queued().len());
    }

    fn numbered(prefix: &str, count: usize) -> Vec<TokenRecord> {
        (0..count)
            .map(|i| token(&format!("{}{}", prefix, i), "SYM"))
            .collect()
    }

    #[test]
    fn first_event_seeds_and_later_events_only_queue() {
        let mut reducer = FeedReducer::new();
        assert_eq!(reducer.phase(), ReducerPhase::Uninitialized);

        reducer.apply_snapshot(snapshot(vec![token("m1", "AAA"), token("m2", "BBB")]));
        assert_eq!(reducer.phase(), ReducerPhase::Seeded);
        assert_eq!(visible_ids(&reducer), vec!["m1", "m2"]);
        assert!(reducer.queued().is_empty());

        reducer.apply_snapshot(snapshot(vec![token("m4", "DDD")]));
        assert_eq!(reducer.phase(), ReducerPhase::Steady);
        assert_eq!(visible_ids(&reducer), vec!["m1", "m2"]);
        assert_eq!(queued_ids(&reducer), vec!["m4"]);
    }

    #[test]
    fn seeding_overflow_goes_to_queue() {
        let mut reducer = FeedReducer::with_limits(3, SymbolCache::default());
        reducer.apply_snapshot(snapshot(numbered("t", 5)));
        assert_eq!(visible_ids(&reducer), vec!["t0", "t1", "t2"]);
        assert_eq!(queued_ids(&reducer), vec!["t3", "t4"]);
    }

    #[test]
    fn applying_the_same_payload_twice_is_idempotent() {
        let mut mixed = numbered("a", 4);
        mixed[1].usd_price = Some(0.5);
        let first = snapshot(numbered("s", 2));
        let payload = serde_json::to_string(&snapshot(mixed)).unwrap();

        let mut once = FeedReducer::new();
        once.apply_snapshot(first.clone());
        once.apply_payload(&payload).unwrap();

        let mut twice = FeedReducer::new();
        twice.apply_snapshot(first);
        twice.apply_payload(&payload).unwrap();
        twice.apply_payload(&payload).unwrap();

        assert_eq!(once.visible(), twice.visible());
        assert_eq!(once.queued(), twice.queued());
        assert_disjoint(&twice);
    }

    #[test]
    fn lists_stay_bounded_and_disjoint() {
        let mut reducer = FeedReducer::with_limits(5, SymbolCache::default());
        reducer.apply_snapshot(snapshot(numbered("seed", 8)));
        for round in 0..10 {
            let mut batch = numbered(&format!("r{}_", round), 7);
            batch.push(token("seed0", "SYM"));
            batch.push(token("seed7", "SYM"));
            reducer.apply_snapshot(snapshot(batch));
            if round % 2 == 0 {
                reducer.drip_tick();
            }
            assert!(reducer.visible().len() <= 5);
            assert!(reducer.queued().len() <= 15);
            assert_disjoint(&reducer);
        }
    }

    #[test]
    fn queue_overflow_drops_oldest_queued() {
        let mut reducer = FeedReducer::with_limits(1, SymbolCache::default());
        reducer.apply_snapshot(snapshot(vec![token("v", "V")]));
        let outcome = reducer.apply_snapshot(snapshot(numbered("q", 5)));
        assert_eq!(outcome.queued, 5);
        assert_eq!(outcome.overflowed, 2);
        assert_eq!(queued_ids(&reducer), vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn drip_reveals_one_per_tick_in_fifo_order() {
        let mut reducer = FeedReducer::new();
        reducer.apply_snapshot(snapshot(vec![token("v", "V")]));
        reducer.apply_snapshot(snapshot(vec![token("a", "A"), token("b", "B")]));
        reducer.apply_snapshot(snapshot(vec![token("c", "C")]));

        assert_eq!(reducer.drip_tick().as_deref(), Some("a"));
        assert_eq!(visible_ids(&reducer), vec!["a", "v"]);
        assert_eq!(reducer.drip_tick().as_deref(), Some("b"));
        assert_eq!(reducer.drip_tick().as_deref(), Some("c"));
        assert_eq!(visible_ids(&reducer), vec!["c", "b", "a", "v"]);
        assert_eq!(reducer.drip_tick(), None);
    }

    #[test]
    fn drip_trims_visible_to_cap() {
        let mut reducer = FeedReducer::with_limits(2, SymbolCache::default());
        reducer.apply_snapshot(snapshot(vec![token("a", "A"), token("b", "B")]));
        reducer.apply_snapshot(snapshot(vec![token("c", "C")]));
        reducer.drip_tick();
        assert_eq!(visible_ids(&reducer), vec!["c", "a"]);
    }

    #[test]
    fn malformed_payload_leaves_state_untouched() {
        let mut reducer = FeedReducer::new();
        reducer.apply_snapshot(snapshot(vec![token("m1", "AAA")]));
        let err = reducer.apply_payload("{not json").unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
        assert_eq!(visible_ids(&reducer), vec!["m1"]);
        assert_eq!(reducer.phase(), ReducerPhase::Seeded);
    }

    #[test]
    fn error_flag_drives_stale_view() {
        let mut reducer = FeedReducer::new();
        reducer.apply_snapshot(snapshot(vec![token("m1", "AAA")]));
        assert!(!reducer.is_stale());

        let mut failed = snapshot(vec![token("m1", "AAA")]);
        failed.error = Some("timeout".to_string());
        reducer.apply_snapshot(failed);
        let view = serde_json::to_value(reducer.view()).unwrap();
        assert_eq!(view["stale"], true);
        assert_eq!(view["error"], "timeout");
        assert_eq!(view["visible"][0]["id"], "m1");
    }

    #[test]
    fn empty_symbols_are_filled_from_cache() {
        let mut reducer = FeedReducer::new();
        reducer.apply_snapshot(snapshot(vec![token("m1", "AAA")]));
        reducer.apply_snapshot(snapshot(vec![token("m1", "")]));
        assert_eq!(reducer.visible()[0].symbol, "AAA");
    }

    #[test]
    fn end_to_end_scenario() {
        let mut reducer = FeedReducer::new();
        let init = r#"{"tokens":[{"id":"m1","symbol":"AAA"},{"id":"m2","symbol":"BBB"}],"fetchedAt":"2024-01-01T00:00:00Z"}"#;
        reducer.apply_payload(init).unwrap();

        let update = r#"{"tokens":[{"id":"m1","symbol":"AAA","usdPrice":1.23},{"id":"m3","symbol":"CCC"}],"fetchedAt":"2024-01-01T00:00:05Z"}"#;
        reducer.apply_payload(update).unwrap();

        assert_eq!(reducer.visible()[0].usd_price, Some(1.23));
        assert_eq!(reducer.visible()[1].id, "m2");
        assert!(reducer.visible()[1].usd_price.is_none());
        assert_eq!(queued_ids(&reducer), vec!["m3"]);

        reducer.drip_tick();
        assert_eq!(visible_ids(&reducer), vec!["m3", "m1", "m2"]);
    }

    #[test]
    fn closed_reducer_ignores_merges_and_drips() {
        let mut reducer = FeedReducer::new();
        reducer.apply_snapshot(snapshot(vec![token("m1", "AAA")]));
        reducer.apply_snapshot(snapshot(vec![token("m2", "BBB")]));
        let before = serde_json::to_value(reducer.view()).unwrap();

        reducer.close();
        assert!(reducer.is_closed());
        let init = r#"{"tokens":[{"id":"m9","symbol":"ZZZ","usdPrice":5}],"fetchedAt":null}"#;
        assert_eq!(reducer.apply_payload(init).unwrap(), MergeOutcome::default());
        assert_eq!(reducer.apply_payload("{oops").unwrap(), MergeOutcome::default());
        assert_eq!(reducer.drip_tick(), None);

        assert_eq!(serde_json::to_value(reducer.view()).unwrap(), before);
        assert_eq!(queued_ids(&reducer), vec!["m2"]);
    }
}
