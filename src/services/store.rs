use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Durable integer key-value storage for reader state.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<i64>>;
    async fn set(&self, key: &str, value: i64) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryPositionStore {
    inner: Mutex<HashMap<String, i64>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn get(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.inner.lock().get(key).copied())
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        self.inner.lock().insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    saved_at: Option<String>,
    entries: BTreeMap<String, i64>,
}

/// Keeps entries in a single JSON file. A missing file reads as empty.
pub struct FilePositionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    write_lock: tokio::sync::Mutex<()>,
}

impl FilePositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_state(&self) -> Result<StoredState> {
        if !self.path.exists() {
            return Ok(StoredState::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl PositionStore for FilePositionStore {
    async fn get(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.read_state().await?.entries.get(key).copied())
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.read_state().await?;
        state.entries.insert(key.to_string(), value);
        state.saved_at = Some(chrono::Utc::now().to_rfc3339());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json_content = serde_json::to_string_pretty(&state)?;
        fs::write(&self.path, json_content).await?;

        debug!("Stored {}={} in {}", key, value, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryPositionStore::new();
        assert_eq!(store.get("reader.page_index").await.unwrap(), None);

        store.set("reader.page_index", 7).await.unwrap();
        assert_eq!(store.get("reader.page_index").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn file_store_survives_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("reader.json");

        let store = FilePositionStore::new(&path);
        assert_eq!(store.get("reader.page_index").await.unwrap(), None);
        store.set("reader.page_index", 3).await.unwrap();
        store.set("reader.theme", 1).await.unwrap();

        let reopened = FilePositionStore::new(&path);
        assert_eq!(reopened.get("reader.page_index").await.unwrap(), Some(3));
        assert_eq!(reopened.get("reader.theme").await.unwrap(), Some(1));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("saved_at"));
    }
}
