// Storage abstraction - allows both file-based (native) and localStorage (WASM)

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, CoreError>;

/// Abstract storage backend trait
/// Native implementations can use files, WASM can use localStorage
#[async_trait(?Send)]
pub trait StorageBackend {
    /// Save data with a key
    async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()>;

    /// Load data by key
    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>>;

    /// Remove data by key
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Standard storage keys used across the application
pub mod keys {
    /// Symbol cache for a feed; suffixed with the feed slug.
    pub const SYMBOL_CACHE_PREFIX: &str = "symbol_cache_";

    pub fn symbol_cache(feed_slug: &str) -> String {
        format!("{}{}", SYMBOL_CACHE_PREFIX, feed_slug)
    }
}
