// Native file-based storage implementation

use crate::error::CoreError;
use crate::storage_trait::{StorageBackend, StorageResult};
use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;

/// One JSON file per key under a base directory.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }
}

#[async_trait(?Send)]
impl StorageBackend for FileStorage {
    async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()> {
        let path = self.path_for(key);
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to create {:?}: {}", self.base_dir, e)))?;

        let json = serde_json::to_string_pretty(data)?;
        // Readers never see a partially written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to replace {:?}: {}", path, e)))?;

        debug!("Saved '{}' to {:?}", key, path);
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let path = self.path_for(key);
        if !self.exists(key).await? {
            debug!("No stored data for '{}'", key);
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to read {:?}: {}", path, e)))?;
        let data = serde_json::from_str(&json)
            .map_err(|e| CoreError::Storage(format!("Corrupt data in {:?}: {}", path, e)))?;
        Ok(Some(data))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        if self.exists(key).await? {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| CoreError::Io(format!("Failed to remove {:?}: {}", path, e)))?;
            debug!("Removed {:?}", path);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|e| CoreError::Io(format!("Failed to stat '{}': {}", key, e)))
    }
}
