use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KvError, KvResult};

const HASH_SEED: u64 = 1125899906842597;

/// 64-bit string hash shared by ring placement and cache partitioning.
pub fn hash_key(key: &str) -> u64 {
    key.bytes()
        .fold(HASH_SEED, |h, byte| h.wrapping_mul(31).wrapping_add(byte as u64))
}

/// A registered replica: its ring position and where to reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReplicaInfo {
    pub id: u64,
    pub host: String,
    pub port: u16,
}

impl ReplicaInfo {
    pub fn new(id: u64, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Registration string form: `<id>@<host>:<port>`.
impl fmt::Display for ReplicaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

impl FromStr for ReplicaInfo {
    type Err = KvError;

    fn from_str(s: &str) -> KvResult<Self> {
        let malformed =
            || KvError::MalformedMessage("improperly formatted replica info string".to_string());

        let (id, address) = s.trim().split_once('@').ok_or_else(malformed)?;
        let (host, port) = address.rsplit_once(':').ok_or_else(malformed)?;
        if host.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            id: id.parse().map_err(|_| malformed())?,
            host: host.to_string(),
            port: port.parse().map_err(|_| malformed())?,
        })
    }
}

/// Replicas ordered by id. Each key lives on a primary and its successor.
#[derive(Debug, Clone, Default)]
pub struct ReplicaRing {
    replicas: Vec<ReplicaInfo>,
}

impl ReplicaRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `info`, replacing any entry with the same id.
    pub fn register(&mut self, info: ReplicaInfo) {
        match self.replicas.binary_search_by_key(&info.id, |r| r.id) {
            Ok(idx) => self.replicas[idx] = info,
            Err(idx) => self.replicas.insert(idx, info),
        }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn replicas(&self) -> &[ReplicaInfo] {
        &self.replicas
    }

    pub fn find(&self, id: u64) -> Option<&ReplicaInfo> {
        self.replicas
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|idx| &self.replicas[idx])
    }

    fn primary_index(&self, key: &str) -> usize {
        let hash = hash_key(key);
        let idx = self.replicas.partition_point(|r| r.id < hash);
        if idx == self.replicas.len() { 0 } else { idx }
    }

    /// Returns `(primary, successor)` for `key`.
    pub fn route(&self, key: &str) -> KvResult<(ReplicaInfo, ReplicaInfo)> {
        if self.replicas.len() < 2 {
            return Err(KvError::InsufficientReplicas {
                registered: self.replicas.len(),
            });
        }

        let primary = self.primary_index(key);
        let successor = (primary + 1) % self.replicas.len();

        Ok((
            self.replicas[primary].clone(),
            self.replicas[successor].clone(),
        ))
    }
}
