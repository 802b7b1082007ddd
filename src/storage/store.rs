use std::path::Path;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, KvResult};

/// A single key-value pair in a store dump.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

/// File format written by [`KvStore::dump_to_file`].
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreDump {
    pub entries: Vec<KeyValuePair>,
}

/// Backing key-value store.
///
/// Stands in for a disk: every access pays `latency` before touching the map.
pub struct KvStore {
    data: DashMap<String, String>,
    latency: Duration,
}

impl KvStore {
    pub fn new(latency: Duration) -> Self {
        Self {
            data: DashMap::new(),
            latency,
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub async fn get(&self, key: &str) -> KvResult<String> {
        self.delay().await;
        self.data
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(KvError::does_not_exist)
    }

    pub async fn put(&self, key: &str, value: &str) {
        self.delay().await;
        self.data.insert(key.to_string(), value.to_string());
    }

    pub async fn del(&self, key: &str) -> KvResult<()> {
        self.delay().await;
        self.data
            .remove(key)
            .map(|_| ())
            .ok_or_else(KvError::does_not_exist)
    }

    pub async fn has_key(&self, key: &str) -> bool {
        self.delay().await;
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes every pair to `path` as a flat JSON list.
    pub fn dump_to_file(&self, path: &Path) -> KvResult<()> {
        let mut entries: Vec<KeyValuePair> = self
            .data
            .iter()
            .map(|entry| KeyValuePair {
                key: entry.key().clone(),
                value: entry.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let json = serde_json::to_vec_pretty(&StoreDump { entries })
            .map_err(|e| KvError::Storage(e.to_string()))?;
        std::fs::write(path, json)?;

        tracing::info!("Dumped {} entries to {}", self.data.len(), path.display());
        Ok(())
    }

    /// Replaces the whole store with the contents of a dump.
    pub fn restore_from_file(&self, path: &Path) -> KvResult<()> {
        let bytes = std::fs::read(path)?;
        let dump: StoreDump =
            serde_json::from_slice(&bytes).map_err(|e| KvError::Storage(e.to_string()))?;

        self.data.clear();
        for pair in dump.entries {
            self.data.insert(pair.key, pair.value);
        }

        tracing::info!("Restored {} entries from {}", self.data.len(), path.display());
        Ok(())
    }
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}
