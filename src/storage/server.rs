//! Per-node key server: cache in front of the backing store.
//!
//! Every operation holds the key's cache-set lock for its whole duration, and
//! every store access additionally runs inside a store-wide section, so a
//! reader never sees the cache and the store disagree about a key.

use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;

use super::cache::Cache;
use super::store::KvStore;
use crate::error::KvResult;
use crate::network::protocol::{validate_key, validate_value};

pub struct KeyServer {
    cache: Cache,
    store: KvStore,
    store_section: Mutex<()>,
}

impl KeyServer {
    pub fn new(num_sets: usize, max_elems_per_set: usize, store_latency: Duration) -> Self {
        Self::with_parts(
            KvStore::new(store_latency),
            Cache::new(num_sets, max_elems_per_set),
        )
    }

    pub fn with_parts(store: KvStore, cache: Cache) -> Self {
        Self {
            cache,
            store,
            store_section: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub async fn put(&self, key: &str, value: &str) -> KvResult<()> {
        validate_key(key)?;
        validate_value(value)?;

        let mut set = self.cache.lock(key).await;
        if set.contains(key) {
            set.put(key, value);
        }

        let _store = self.store_section.lock().await;
        self.store.put(key, value).await;

        Ok(())
    }

    pub async fn get(&self, key: &str) -> KvResult<String> {
        validate_key(key)?;

        let mut set = self.cache.lock(key).await;
        if let Some(value) = set.get(key) {
            tracing::trace!("Cache hit for {}", key);
            return Ok(value);
        }

        let _store = self.store_section.lock().await;
        let value = self.store.get(key).await?;
        set.put(key, &value);

        Ok(value)
    }

    pub async fn del(&self, key: &str) -> KvResult<()> {
        validate_key(key)?;

        let mut set = self.cache.lock(key).await;
        set.del(key);

        let _store = self.store_section.lock().await;
        self.store.del(key).await
    }

    /// Store-only existence check; leaves the cache untouched.
    pub async fn has_key(&self, key: &str) -> bool {
        let _store = self.store_section.lock().await;
        self.store.has_key(key).await
    }

    pub async fn dump_to_file(&self, path: &Path) -> KvResult<()> {
        let _store = self.store_section.lock().await;
        self.store.dump_to_file(path)
    }

    /// Replaces the store with a dump and drops every cached entry with it.
    pub async fn restore_from_file(&self, path: &Path) -> KvResult<()> {
        {
            let _store = self.store_section.lock().await;
            self.store.restore_from_file(path)?;
        }
        // Set locks are always taken before the store section, never after.
        self.cache.clear().await;
        Ok(())
    }
}
