// Symbol cache - remembers id -> symbol so records streamed without a
// symbol still render with one. Persisted through StorageBackend.

use crate::error::CoreError;
use crate::models::TokenRecord;
use crate::storage_trait::StorageBackend;
use log::debug;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

pub const SYMBOL_CACHE_CAPACITY: usize = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolEntry {
    pub id: String,
    pub symbol: String,
}

pub struct SymbolCache {
    entries: LruCache<String, String>,
    dirty: bool,
}

impl SymbolCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            dirty: false,
        }
    }

    /// Rebuild from persisted entries, oldest first.
    pub fn from_entries(entries: Vec<SymbolEntry>, capacity: usize) -> Self {
        let mut cache = Self::new(capacity);
        for entry in entries {
            if !entry.symbol.is_empty() {
                cache.entries.put(entry.id, entry.symbol);
            }
        }
        cache
    }

    /// Fill an empty symbol from the cache, or remember a non-empty one.
    pub fn observe(&mut self, token: &mut TokenRecord) {
        if token.symbol.is_empty() {
            if let Some(symbol) = self.entries.get(&token.id) {
                token.symbol = symbol.clone();
            }
            return;
        }
        let changed = self
            .entries
            .peek(&token.id)
            .map_or(true, |known| known != &token.symbol);
        self.entries.put(token.id.clone(), token.symbol.clone());
        if changed {
            self.dirty = true;
        }
    }

    pub fn get(&mut self, id: &str) -> Option<&String> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Entries ordered oldest first, so reloading keeps recency.
    pub fn to_entries(&self) -> Vec<SymbolEntry> {
        self.entries
            .iter()
            .rev()
            .map(|(id, symbol)| SymbolEntry {
                id: id.clone(),
                symbol: symbol.clone(),
            })
            .collect()
    }

    pub async fn load<S: StorageBackend>(
        storage: &S,
        key: &str,
        capacity: usize,
    ) -> Result<Self, CoreError> {
        let entries: Vec<SymbolEntry> = storage.load(key).await?.unwrap_or_default();
        debug!("Loaded {} cached symbols from '{}'", entries.len(), key);
        Ok(Self::from_entries(entries, capacity))
    }

    /// Fold newer entries on top of this cache.
    pub fn extend_from(&mut self, newer: &SymbolCache) {
        for entry in newer.to_entries() {
            self.entries.put(entry.id, entry.symbol);
            self.dirty = true;
        }
    }

    /// Entries to write back, if anything changed since the last call.
    pub fn take_dirty_entries(&mut self) -> Option<Vec<SymbolEntry>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.to_entries())
    }

    /// Write the cache back if anything changed since the last persist.
    pub async fn persist<S: StorageBackend>(
        &mut self,
        storage: &S,
        key: &str,
    ) -> Result<bool, CoreError> {
        let Some(entries) = self.take_dirty_entries() else {
            return Ok(false);
        };
        if let Err(e) = storage.save(key, &entries).await {
            self.dirty = true;
            return Err(e);
        }
        Ok(true)
    }
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new(SYMBOL_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_missing_symbol_from_earlier_record() {
        let mut cache = SymbolCache::default();
        let mut first = TokenRecord::new("m1", "AAA");
        cache.observe(&mut first);

        let mut later = TokenRecord::new("m1", "");
        cache.observe(&mut later);
        assert_eq!(later.symbol, "AAA");

        let mut unknown = TokenRecord::new("m9", "");
        cache.observe(&mut unknown);
        assert!(unknown.symbol.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = SymbolCache::new(2);
        cache.observe(&mut TokenRecord::new("a", "A"));
        cache.observe(&mut TokenRecord::new("b", "B"));
        cache.get("a");
        cache.observe(&mut TokenRecord::new("c", "C"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").map(String::as_str), Some("A"));
    }

    #[test]
    fn entries_reload_in_recency_order() {
        let mut cache = SymbolCache::new(3);
        cache.observe(&mut TokenRecord::new("a", "A"));
        cache.observe(&mut TokenRecord::new("b", "B"));
        let entries = cache.to_entries();
        assert_eq!(entries[0].id, "a");

        let mut reloaded = SymbolCache::from_entries(entries, 2);
        reloaded.observe(&mut TokenRecord::new("c", "C"));
        assert!(reloaded.get("a").is_none());
        assert!(reloaded.get("b").is_some());
    }

    #[test]
    fn newer_entries_win_when_extending() {
        let mut loaded = SymbolCache::from_entries(
            vec![SymbolEntry {
                id: "a".to_string(),
                symbol: "OLD".to_string(),
            }],
            10,
        );
        let mut live = SymbolCache::default();
        live.observe(&mut TokenRecord::new("a", "NEW"));
        loaded.extend_from(&live);
        assert_eq!(loaded.get("a").map(String::as_str), Some("NEW"));
        assert!(loaded.take_dirty_entries().is_some());
        assert!(loaded.take_dirty_entries().is_none());
    }

    #[test]
    fn unchanged_symbols_do_not_mark_dirty() {
        let mut cache = SymbolCache::from_entries(
            vec![SymbolEntry {
                id: "a".to_string(),
                symbol: "A".to_string(),
            }],
            10,
        );
        cache.observe(&mut TokenRecord::new("a", "A"));
        assert!(!cache.is_dirty());
        cache.observe(&mut TokenRecord::new("a", "A2"));
        assert!(cache.is_dirty());
    }
}
