//! Storage Module Tests
//!
//! Validates the node-local storage stack.
//!
//! ## Test Scopes
//! - **Cache**: second-chance eviction order, per-set capacity, overwrite/delete.
//! - **KvStore**: missing keys and dump/restore.
//! - **KeyServer**: cache/store coherence and input validation.

#[cfg(test)]
mod tests {
    use crate::error::KvError;
    use crate::network::protocol::{MAX_KEY_SIZE, MAX_VALUE_SIZE};
    use crate::storage::cache::Cache;
    use crate::storage::server::KeyServer;
    use crate::storage::store::KvStore;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn cache_get(cache: &Cache, key: &str) -> Option<String> {
        cache.lock(key).await.get(key)
    }

    async fn cache_put(cache: &Cache, key: &str, value: &str) {
        cache.lock(key).await.put(key, value);
    }

    // ============================================================
    // CACHE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = Cache::new(1, 2);
        cache_put(&cache, "testKey", "testValue").await;
        assert_eq!(cache_get(&cache, "testKey").await.as_deref(), Some("testValue"));
    }

    #[tokio::test]
    async fn test_cache_del() {
        let cache = Cache::new(1, 2);
        cache_put(&cache, "testKey", "testValue").await;
        cache.lock("testKey").await.del("testKey");
        assert_eq!(cache_get(&cache, "testKey").await, None);

        // Deleting a missing key is a no-op.
        cache.lock("missing").await.del("missing");
    }

    #[tokio::test]
    async fn test_cache_overwrite() {
        let cache = Cache::new(1, 2);
        cache_put(&cache, "testKey", "testValue").await;
        cache_put(&cache, "testKey", "newValue").await;
        assert_eq!(cache_get(&cache, "testKey").await.as_deref(), Some("newValue"));
        assert_eq!(cache.lock("testKey").await.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_second_chance_replacement() {
        // One set of two slots, so every key competes for the same set.
        let cache = Cache::new(1, 2);

        cache_put(&cache, "1", "one").await;
        cache_put(&cache, "2", "two").await;
        cache_put(&cache, "3", "three").await;
        // Oldest with a clear bit goes first.
        assert_eq!(cache_get(&cache, "1").await, None);

        // Re-putting "2" references it, so "3" is the victim.
        cache_put(&cache, "2", "two").await;
        cache_put(&cache, "4", "four").await;
        assert_eq!(cache_get(&cache, "3").await, None);

        // "2" used its second chance on the previous sweep.
        cache_put(&cache, "5", "five").await;
        assert_eq!(cache_get(&cache, "2").await, None);

        // Reading "4" references it, so "5" is evicted instead.
        assert_eq!(cache_get(&cache, "4").await.as_deref(), Some("four"));
        cache_put(&cache, "6", "six").await;
        assert_eq!(cache_get(&cache, "5").await, None);
        assert_eq!(cache_get(&cache, "4").await.as_deref(), Some("four"));
        assert_eq!(cache_get(&cache, "6").await.as_deref(), Some("six"));
    }

    #[tokio::test]
    async fn test_cache_sets_never_exceed_capacity() {
        let cache = Cache::new(4, 3);

        for i in 0..200 {
            let key = format!("key_{}", i);
            cache_put(&cache, &key, "v").await;
            if i % 3 == 0 {
                cache_get(&cache, &key).await;
            }
        }

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 4);
        for set in snapshot {
            assert!(set.entries.len() <= 3, "set {} overflowed", set.id);
            assert_eq!(set.capacity, 3);
        }
    }

    #[tokio::test]
    async fn test_cache_snapshot_tracks_referenced_bit() {
        let cache = Cache::new(1, 2);
        cache_put(&cache, "1", "one").await;

        let before = cache.snapshot().await;
        assert_eq!(before[0].entries.len(), 1);
        assert!(!before[0].entries[0].referenced);

        cache_get(&cache, "1").await;
        let after = cache.snapshot().await;
        assert!(after[0].entries[0].referenced);

        cache.clear().await;
        assert!(cache.snapshot().await[0].entries.is_empty());
    }

    #[tokio::test]
    async fn test_cache_partition_is_deterministic() {
        let cache = Cache::new(16, 4);
        let set = cache.set_id("book_100");
        assert_eq!(set, cache.set_id("book_100"));
        assert!(set < cache.num_sets());
        assert_eq!(cache.lock("book_100").await.set_id(), set);
    }

    // ============================================================
    // STORE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_store_missing_key() {
        let store = KvStore::default();
        assert_eq!(store.get("nope").await, Err(KvError::does_not_exist()));
        assert_eq!(store.del("nope").await, Err(KvError::does_not_exist()));
        assert!(!store.has_key("nope").await);
    }

    #[tokio::test]
    async fn test_store_dump_and_restore_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let source = KvStore::default();
        source.put("a", "1").await;
        source.put("b", "2").await;
        source.dump_to_file(&path).unwrap();

        let target = KvStore::default();
        target.put("stale", "x").await;
        target.restore_from_file(&path).unwrap();

        assert_eq!(target.len(), 2);
        assert_eq!(target.get("a").await.unwrap(), "1");
        assert_eq!(target.get("b").await.unwrap(), "2");
        assert!(!target.has_key("stale").await);
    }

    #[tokio::test]
    async fn test_store_latency_is_applied() {
        let store = KvStore::new(Duration::from_millis(20));
        let started = std::time::Instant::now();
        store.put("k", "v").await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    // ============================================================
    // KEY SERVER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_key_server_put_then_get_is_coherent() {
        let server = KeyServer::new(5, 5, Duration::ZERO);

        server.put("k", "v1").await.unwrap();
        assert_eq!(server.get("k").await.unwrap(), "v1");
        assert_eq!(server.cache().lock("k").await.get("k").as_deref(), Some("v1"));
        assert_eq!(server.store().get("k").await.unwrap(), "v1");

        // The cached entry is refreshed by the next write.
        server.put("k", "v2").await.unwrap();
        assert_eq!(server.cache().lock("k").await.get("k").as_deref(), Some("v2"));
        assert_eq!(server.store().get("k").await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_key_server_put_does_not_prime_cache() {
        let server = KeyServer::new(5, 5, Duration::ZERO);
        server.put("k", "v").await.unwrap();
        assert!(!server.cache().lock("k").await.contains("k"));
    }

    #[tokio::test]
    async fn test_key_server_del_then_get_is_not_found() {
        let server = KeyServer::new(5, 5, Duration::ZERO);

        server.put("k", "v").await.unwrap();
        server.get("k").await.unwrap();
        server.del("k").await.unwrap();

        assert!(server.get("k").await.unwrap_err().is_not_found());
        assert!(!server.cache().lock("k").await.contains("k"));
        assert!(server.del("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_key_server_rejects_oversized_without_mutation() {
        let server = KeyServer::new(5, 5, Duration::ZERO);
        let long_key = "k".repeat(MAX_KEY_SIZE + 1);
        let long_value = "v".repeat(MAX_VALUE_SIZE + 1);

        assert_eq!(server.put(&long_key, "v").await, Err(KvError::OversizedKey));
        assert_eq!(server.put("k", &long_value).await, Err(KvError::OversizedValue));

        assert!(server.store().is_empty());
        assert!(!server.has_key("k").await);
        for set in server.cache().snapshot().await {
            assert!(set.entries.is_empty());
        }
    }

    #[tokio::test]
    async fn test_key_server_has_key_leaves_cache_alone() {
        let server = KeyServer::new(5, 5, Duration::ZERO);
        server.put("k", "v").await.unwrap();

        assert!(server.has_key("k").await);
        assert!(!server.has_key("other").await);
        assert!(!server.cache().lock("k").await.contains("k"));
    }

    #[tokio::test]
    async fn test_key_server_restore_clears_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.json");

        let server = KeyServer::new(5, 5, Duration::ZERO);
        server.put("k", "old").await.unwrap();
        server.dump_to_file(&path).await.unwrap();

        server.put("k", "new").await.unwrap();
        assert_eq!(server.get("k").await.unwrap(), "new");

        server.restore_from_file(&path).await.unwrap();
        assert_eq!(server.get("k").await.unwrap(), "old");
    }

    #[tokio::test]
    async fn test_key_server_concurrent_writers_stay_coherent() {
        let server = std::sync::Arc::new(KeyServer::new(2, 2, Duration::from_millis(1)));

        let mut handles = Vec::new();
        for writer in 0..8 {
            let server = server.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let key = format!("key_{}", i);
                    server.put(&key, &format!("w{}", writer)).await.unwrap();
                    server.get(&key).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10 {
            let key = format!("key_{}", i);
            let stored = server.store().get(&key).await.unwrap();
            if let Some(cached) = server.cache().lock(&key).await.get(&key) {
                assert_eq!(cached, stored, "cache and store diverged for {}", key);
            }
        }
    }
}
