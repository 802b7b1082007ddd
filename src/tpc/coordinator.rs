//! Coordinator side of two-phase commit.
//!
//! ## Responsibilities
//! - **Membership**: keeps the replica ring, fed by registration messages.
//! - **Writes**: drives put/delete through both replicas of a key, one
//!   operation at a time, and delivers the decision until both acknowledge.
//! - **Reads**: serves gets from its own cache, falling back to the primary
//!   and then the successor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use super::ring::{ReplicaInfo, ReplicaRing};
use crate::error::{KvError, KvResult};
use crate::network::protocol::{KvMessage, MessageType, SUCCESS, validate_key, validate_value};
use crate::network::server::{MessageHandlerFn, handler_fn};
use crate::network::transport;
use crate::storage::cache::Cache;

const DEFAULT_RETRY_INITIAL: Duration = Duration::from_millis(100);
const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(5);

pub struct Coordinator {
    ring: RwLock<ReplicaRing>,
    next_operation_id: AtomicU64,
    operation_lock: Mutex<()>,
    cache: Cache,
    timeout: Duration,
    retry_initial: Duration,
    retry_max: Duration,
}

impl Coordinator {
    pub fn new(num_sets: usize, max_elems_per_set: usize, timeout: Duration) -> Self {
        Self {
            ring: RwLock::new(ReplicaRing::new()),
            next_operation_id: AtomicU64::new(1),
            operation_lock: Mutex::new(()),
            cache: Cache::new(num_sets, max_elems_per_set),
            timeout,
            retry_initial: DEFAULT_RETRY_INITIAL,
            retry_max: DEFAULT_RETRY_MAX,
        }
    }

    /// Sets the first and the largest pause between decision delivery attempts.
    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_initial = initial.max(Duration::from_millis(1));
        self.retry_max = max.max(self.retry_initial);
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // --- Membership ---

    pub async fn register(&self, info: ReplicaInfo) {
        tracing::info!("Registered replica {}", info);
        self.ring.write().await.register(info);
    }

    pub async fn replicas(&self) -> Vec<ReplicaInfo> {
        self.ring.read().await.replicas().to_vec()
    }

    pub async fn route(&self, key: &str) -> KvResult<(ReplicaInfo, ReplicaInfo)> {
        self.ring.read().await.route(key)
    }

    /// Handles one message on the registration port. Always replies.
    pub async fn handle_registration(&self, message: KvMessage) -> KvMessage {
        if message.msg_type != MessageType::Register {
            return KvMessage::from_error(&KvError::UnknownMessageType(
                message.msg_type.to_string(),
            ));
        }

        let info = message
            .message
            .as_deref()
            .unwrap_or_default()
            .parse::<ReplicaInfo>();

        match info {
            Ok(info) => {
                self.register(info).await;
                KvMessage::response(SUCCESS)
            }
            Err(e) => {
                tracing::warn!("Rejected registration: {}", e);
                KvMessage::from_error(&e)
            }
        }
    }

    pub fn into_registration_handler(self: Arc<Self>) -> MessageHandlerFn {
        handler_fn(move |message| {
            let coordinator = self.clone();
            async move { Some(coordinator.handle_registration(message).await) }
        })
    }

    /// Asks replica `replica_id` to drop its next 2PC message.
    pub async fn ignore_next(&self, replica_id: u64) -> KvResult<()> {
        let replica = self
            .ring
            .read()
            .await
            .find(replica_id)
            .cloned()
            .ok_or_else(|| KvError::NotFound(format!("No replica registered with id {}", replica_id)))?;

        let reply = transport::request(&replica.address(), &KvMessage::ignore_next(), self.timeout).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(KvError::Network(format!(
                "Replica {} refused ignore-next: {}",
                replica_id,
                describe(&Ok(reply))
            )))
        }
    }

    // --- Writes ---

    pub async fn put(&self, key: &str, value: &str) -> KvResult<()> {
        self.perform_operation(key, Some(value), true).await
    }

    pub async fn del(&self, key: &str) -> KvResult<()> {
        self.perform_operation(key, None, false).await
    }

    /// Runs one put (`is_put`) or delete through both replicas of `key`.
    ///
    /// Returns only after both replicas acknowledged the decision. An aborted
    /// operation fails with every replica's reason merged into one message.
    pub async fn perform_operation(
        &self,
        key: &str,
        value: Option<&str>,
        is_put: bool,
    ) -> KvResult<()> {
        validate_key(key)?;
        let value = match (is_put, value) {
            (true, Some(value)) => {
                validate_value(value)?;
                Some(value)
            }
            (true, None) => {
                return Err(KvError::MalformedMessage("put without a value".to_string()));
            }
            (false, _) => None,
        };

        let _operation = self.operation_lock.lock().await;

        let (primary, successor) = self.route(key).await?;
        let operation_id = self.next_operation_id.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.cache.lock(key).await;

        let request = match value {
            Some(value) => KvMessage::put_request(key, value, operation_id),
            None => KvMessage::delete_request(key, operation_id),
        };

        tracing::debug!(
            "Operation {}: {} {} on replicas {} and {}",
            operation_id,
            request.msg_type,
            key,
            primary.id,
            successor.id
        );

        let (primary_addr, successor_addr) = (primary.address(), successor.address());
        let (first, second) = tokio::join!(
            transport::request(&primary_addr, &request, self.timeout),
            transport::request(&successor_addr, &request, self.timeout),
        );

        let commit = is_ready(&first, operation_id) && is_ready(&second, operation_id);
        let decision = if commit {
            KvMessage::commit(operation_id)
        } else {
            KvMessage::abort(operation_id, None)
        };

        tokio::join!(
            self.deliver_until_ack(&primary, &decision),
            self.deliver_until_ack(&successor, &decision),
        );

        if !commit {
            let merged = merge_replies(&primary, &first, &successor, &second);
            tracing::info!("Operation {} aborted: {}", operation_id, merged.replace('\n', " "));
            return Err(KvError::Aborted(merged));
        }

        if slot.contains(key) {
            match value {
                Some(value) => slot.put(key, value),
                None => slot.del(key),
            }
        }

        tracing::debug!("Operation {} committed", operation_id);
        Ok(())
    }

    async fn deliver_until_ack(&self, replica: &ReplicaInfo, decision: &KvMessage) {
        let address = replica.address();
        let mut delay = self.retry_initial;
        let mut attempt: u32 = 1;

        loop {
            match transport::request(&address, decision, self.timeout).await {
                Ok(reply)
                    if reply.msg_type == MessageType::Ack
                        && reply.operation_id == decision.operation_id =>
                {
                    tracing::debug!(
                        "Replica {} acknowledged {} for operation {:?}",
                        replica.id,
                        decision.msg_type,
                        decision.operation_id
                    );
                    return;
                }
                Ok(reply) => tracing::warn!(
                    "Attempt {} to deliver {} to replica {} got {} instead of ack",
                    attempt,
                    decision.msg_type,
                    replica.id,
                    describe(&Ok(reply))
                ),
                Err(e) => tracing::warn!(
                    "Attempt {} to deliver {} to replica {} failed: {}",
                    attempt,
                    decision.msg_type,
                    replica.id,
                    e
                ),
            }

            let jitter = Duration::from_millis(rand::random::<u64>() % 50);
            tokio::time::sleep(delay + jitter).await;
            delay = (delay * 2).min(self.retry_max);
            attempt += 1;
        }
    }

    // --- Reads ---

    /// Reads `key` from the coordinator cache, else from its primary, else
    /// from its successor. A value read from a replica is cached.
    pub async fn handle_get(&self, key: &str) -> KvResult<String> {
        validate_key(key)?;

        let mut slot = self.cache.lock(key).await;
        if let Some(value) = slot.get(key) {
            tracing::trace!("Coordinator cache hit for {}", key);
            return Ok(value);
        }

        let (primary, successor) = self.route(key).await?;
        let request = KvMessage::get_request(key);

        let first = transport::request(&primary.address(), &request, self.timeout).await;
        if let Some(value) = value_of(&first) {
            slot.put(key, &value);
            return Ok(value);
        }

        let second = transport::request(&successor.address(), &request, self.timeout).await;
        if let Some(value) = value_of(&second) {
            slot.put(key, &value);
            return Ok(value);
        }

        Err(KvError::NotFound(merge_replies(
            &primary, &first, &successor, &second,
        )))
    }
}

fn is_ready(reply: &KvResult<KvMessage>, operation_id: u64) -> bool {
    matches!(reply, Ok(m) if m.msg_type == MessageType::Ready && m.operation_id == Some(operation_id))
}

fn value_of(reply: &KvResult<KvMessage>) -> Option<String> {
    match reply {
        Ok(m) if m.msg_type == MessageType::Response => m.value.clone(),
        _ => None,
    }
}

fn describe(reply: &KvResult<KvMessage>) -> String {
    match reply {
        Ok(m) => m.message.clone().unwrap_or_else(|| m.msg_type.to_string()),
        Err(e) => e.to_string(),
    }
}

/// `@<id>:=<text>` for each replica, one per line.
fn merge_replies(
    first_replica: &ReplicaInfo,
    first: &KvResult<KvMessage>,
    second_replica: &ReplicaInfo,
    second: &KvResult<KvMessage>,
) -> String {
    format!(
        "@{}:={}\n@{}:={}",
        first_replica.id,
        describe(first),
        second_replica.id,
        describe(second)
    )
}
