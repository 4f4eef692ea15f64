// WASM localStorage-based storage implementation

use crate::error::CoreError;
use crate::storage_trait::{StorageBackend, StorageResult};
use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use web_sys::window;

/// LocalStorage-based storage backend for WASM mode
pub struct LocalStorageBackend {
    prefix: String,
}

impl LocalStorageBackend {
    /// Create a new localStorage backend with the specified key prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Create default instance with "memescope_" prefix
    pub fn default_instance() -> Self {
        Self::new("memescope_")
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn storage(&self) -> StorageResult<web_sys::Storage> {
        window()
            .ok_or_else(|| CoreError::Init("No window object available".to_string()))?
            .local_storage()
            .map_err(|e| CoreError::Storage(format!("Failed to access localStorage: {:?}", e)))?
            .ok_or_else(|| CoreError::Init("localStorage not available".to_string()))
    }
}

#[async_trait(?Send)]
impl StorageBackend for LocalStorageBackend {
    async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()> {
        let full_key = self.full_key(key);
        let json = serde_json::to_string(data)?;
        // Quota errors surface here; the caller decides whether they matter.
        self.storage()?
            .set_item(&full_key, &json)
            .map_err(|e| CoreError::Storage(format!("Failed to save '{}': {:?}", full_key, e)))?;
        debug!("Saved {} bytes to localStorage key {}", json.len(), full_key);
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let full_key = self.full_key(key);
        let json = self
            .storage()?
            .get_item(&full_key)
            .map_err(|e| CoreError::Storage(format!("Failed to read '{}': {:?}", full_key, e)))?;

        let Some(json) = json else {
            debug!("Key does not exist in localStorage: {}", full_key);
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CoreError::Storage(format!("Corrupt data in '{}': {}", full_key, e)))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);
        self.storage()?
            .remove_item(&full_key)
            .map_err(|e| CoreError::Storage(format!("Failed to remove '{}': {:?}", full_key, e)))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        let item = self
            .storage()?
            .get_item(&full_key)
            .map_err(|e| CoreError::Storage(format!("Failed to check '{}': {:?}", full_key, e)))?;
        Ok(item.is_some())
    }
}
