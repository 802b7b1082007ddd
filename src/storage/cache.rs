//! Set-associative cache with second-chance eviction.
//!
//! Keys are spread over `num_sets` independent sets, each behind its own
//! lock. Callers take the lock with [`Cache::lock`] and operate on the returned
//! [`PartitionGuard`]; holding the guard across several calls makes a
//! read-modify-write on that set atomic.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::tpc::ring::hash_key;

#[derive(Debug, Clone)]
struct CacheNode {
    key: String,
    value: String,
    referenced: bool,
}

/// One set of the cache, oldest entry at the front.
#[derive(Debug)]
pub struct CacheSet {
    nodes: VecDeque<CacheNode>,
    capacity: usize,
}

impl CacheSet {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        self.nodes.iter_mut().find(|node| node.key == key).map(|node| {
            node.referenced = true;
            node.value.clone()
        })
    }

    /// Looks for `key` without touching its referenced bit.
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.iter().any(|node| node.key == key)
    }

    pub fn put(&mut self, key: &str, value: &str) {
        if let Some(node) = self.nodes.iter_mut().find(|node| node.key == key) {
            node.value = value.to_string();
            node.referenced = true;
            return;
        }

        if self.nodes.len() >= self.capacity {
            self.evict();
        }

        self.nodes.push_back(CacheNode {
            key: key.to_string(),
            value: value.to_string(),
            referenced: false,
        });
    }

    pub fn del(&mut self, key: &str) {
        self.nodes.retain(|node| node.key != key);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&mut self) {
        self.nodes.clear();
    }

    // Terminates: every referenced node popped is cleared, so at most one
    // full sweep happens before an unreferenced node comes up.
    fn evict(&mut self) {
        while let Some(mut oldest) = self.nodes.pop_front() {
            if oldest.referenced {
                oldest.referenced = false;
                self.nodes.push_back(oldest);
            } else {
                tracing::trace!("Evicting cache entry {}", oldest.key);
                return;
            }
        }
    }
}

/// Scoped lock handle over the set that owns `key`.
///
/// The lock is released when the guard is dropped.
pub struct PartitionGuard<'a> {
    set_id: usize,
    num_sets: usize,
    set: MutexGuard<'a, CacheSet>,
}

impl PartitionGuard<'_> {
    pub fn set_id(&self) -> usize {
        self.set_id
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        self.check_key(key);
        self.set.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.check_key(key);
        self.set.contains(key)
    }

    pub fn put(&mut self, key: &str, value: &str) {
        self.check_key(key);
        self.set.put(key, value);
    }

    pub fn del(&mut self, key: &str) {
        self.check_key(key);
        self.set.del(key);
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn check_key(&self, key: &str) {
        debug_assert_eq!(
            partition_of(key, self.num_sets),
            self.set_id,
            "key {} does not belong to locked set {}",
            key,
            self.set_id
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntrySnapshot {
    pub key: String,
    pub value: String,
    pub referenced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSetSnapshot {
    pub id: usize,
    pub capacity: usize,
    pub entries: Vec<CacheEntrySnapshot>,
}

pub struct Cache {
    sets: Vec<Mutex<CacheSet>>,
    max_elems_per_set: usize,
}

impl Cache {
    pub fn new(num_sets: usize, max_elems_per_set: usize) -> Self {
        let num_sets = num_sets.max(1);
        let max_elems_per_set = max_elems_per_set.max(1);

        Self {
            sets: (0..num_sets)
                .map(|_| Mutex::new(CacheSet::new(max_elems_per_set)))
                .collect(),
            max_elems_per_set,
        }
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn max_elems_per_set(&self) -> usize {
        self.max_elems_per_set
    }

    pub fn set_id(&self, key: &str) -> usize {
        partition_of(key, self.sets.len())
    }

    pub async fn lock(&self, key: &str) -> PartitionGuard<'_> {
        let set_id = self.set_id(key);
        PartitionGuard {
            set_id,
            num_sets: self.sets.len(),
            set: self.sets[set_id].lock().await,
        }
    }

    /// Drops every entry, one set at a time.
    pub async fn clear(&self) {
        for set in &self.sets {
            set.lock().await.clear();
        }
    }

    pub async fn snapshot(&self) -> Vec<CacheSetSnapshot> {
        let mut snapshot = Vec::with_capacity(self.sets.len());

        for (id, set) in self.sets.iter().enumerate() {
            let set = set.lock().await;
            snapshot.push(CacheSetSnapshot {
                id,
                capacity: set.capacity,
                entries: set
                    .nodes
                    .iter()
                    .map(|node| CacheEntrySnapshot {
                        key: node.key.clone(),
                        value: node.value.clone(),
                        referenced: node.referenced,
                    })
                    .collect(),
            });
        }

        snapshot
    }
}

fn partition_of(key: &str, num_sets: usize) -> usize {
    (hash_key(key) % num_sets as u64) as usize
}
