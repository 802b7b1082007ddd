//! Participant side of two-phase commit.
//!
//! A replica answers phase-1 requests with a vote, remembers the request it
//! voted `ready` for, and applies or drops it when the coordinator's decision
//! arrives. Every step is written to the [`RecoveryLog`] before the reply
//! leaves, so a restarted replica can pick up an undecided operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::log::RecoveryLog;
use super::ring::ReplicaInfo;
use crate::error::{KvError, KvResult};
use crate::network::protocol::{KvMessage, MessageType, SUCCESS};
use crate::network::server::{MessageHandlerFn, handler_fn};
use crate::network::transport;
use crate::storage::server::KeyServer;

#[derive(Debug, Default)]
struct ParticipantState {
    ignore_next: bool,
    pending: Option<KvMessage>,
}

pub struct ParticipantHandler {
    replica_id: u64,
    server: Arc<KeyServer>,
    log: Arc<Mutex<RecoveryLog>>,
    state: Mutex<ParticipantState>,
}

impl ParticipantHandler {
    pub fn new(replica_id: u64, server: Arc<KeyServer>, log: Arc<Mutex<RecoveryLog>>) -> Self {
        Self {
            replica_id,
            server,
            log,
            state: Mutex::new(ParticipantState::default()),
        }
    }

    pub fn replica_id(&self) -> u64 {
        self.replica_id
    }

    pub fn server(&self) -> &Arc<KeyServer> {
        &self.server
    }

    pub fn log(&self) -> &Arc<Mutex<RecoveryLog>> {
        &self.log
    }

    /// The request currently awaiting a decision, if any.
    pub async fn pending_operation(&self) -> Option<KvMessage> {
        self.state.lock().await.pending.clone()
    }

    /// Wraps this handler for a [`SocketServer`](crate::network::server::SocketServer).
    pub fn into_handler(self: Arc<Self>) -> MessageHandlerFn {
        handler_fn(move |message| {
            let participant = self.clone();
            async move { participant.handle_message(message).await }
        })
    }

    /// Dispatches one incoming message. `None` means the connection is closed
    /// without a reply.
    pub async fn handle_message(&self, message: KvMessage) -> Option<KvMessage> {
        if let Err(e) = message.validate() {
            return Some(KvMessage::from_error(&e));
        }

        match message.msg_type {
            MessageType::PutRequest | MessageType::DeleteRequest => {
                Some(self.handle_request(message).await)
            }
            MessageType::Commit | MessageType::Abort => self.handle_decision(message).await,
            MessageType::GetRequest => Some(self.handle_get(message).await),
            MessageType::IgnoreNext => {
                self.state.lock().await.ignore_next = true;
                tracing::info!("Replica {} will ignore the next 2PC message", self.replica_id);
                Some(KvMessage::response(SUCCESS))
            }
            other => Some(KvMessage::from_error(&KvError::UnknownMessageType(
                other.to_string(),
            ))),
        }
    }

    async fn handle_get(&self, message: KvMessage) -> KvMessage {
        let key = message.key.unwrap_or_default();
        match self.server.get(&key).await {
            Ok(value) => KvMessage::value_response(&key, &value),
            Err(e) => KvMessage::from_error(&e),
        }
    }

    async fn handle_request(&self, message: KvMessage) -> KvMessage {
        let mut state = self.state.lock().await;

        if state.ignore_next {
            state.ignore_next = false;
            tracing::warn!(
                "Replica {} ignoring {} for operation {:?}",
                self.replica_id,
                message.msg_type,
                message.operation_id
            );
            return KvMessage::from_error(&KvError::IgnoredOperation(format!(
                "IgnoreNext Error: replica {} has ignored this 2PC request during the first phase",
                self.replica_id
            )));
        }

        let Some(operation_id) = message.operation_id else {
            return KvMessage::from_error(&KvError::MalformedMessage(format!(
                "{} message without operationId",
                message.msg_type
            )));
        };
        let key = message.key.clone().unwrap_or_default();

        if message.msg_type == MessageType::DeleteRequest && !self.server.has_key(&key).await {
            tracing::info!(
                "Replica {} votes abort on operation {}: {} does not exist",
                self.replica_id,
                operation_id,
                key
            );
            return KvMessage::abort(operation_id, Some(KvError::does_not_exist().to_string()));
        }

        let ready = KvMessage::ready(operation_id);
        {
            let mut log = self.log.lock().await;
            let logged = log.append(&message).and_then(|_| log.append(&ready));
            if let Err(e) = logged {
                tracing::error!(
                    "Replica {} could not log operation {}: {}",
                    self.replica_id,
                    operation_id,
                    e
                );
                if let Err(e) = log.append(&KvMessage::abort(operation_id, None)) {
                    tracing::error!("Replica {} could not log abort: {}", self.replica_id, e);
                }
                return KvMessage::abort(operation_id, Some(e.to_string()));
            }
        }

        if let Some(previous) = state.pending.replace(message) {
            tracing::warn!(
                "Replica {} dropping undecided operation {:?}",
                self.replica_id,
                previous.operation_id
            );
        }

        tracing::debug!("Replica {} ready for operation {}", self.replica_id, operation_id);
        ready
    }

    async fn handle_decision(&self, decision: KvMessage) -> Option<KvMessage> {
        let mut state = self.state.lock().await;

        if state.ignore_next {
            state.ignore_next = false;
            tracing::warn!(
                "Replica {} ignoring {} for operation {:?}",
                self.replica_id,
                decision.msg_type,
                decision.operation_id
            );
            return None;
        }

        let mut log = self.log.lock().await;

        if state.pending.is_none()
            && let Some(recovered) = log.get_interrupted_operation()
        {
            tracing::info!(
                "Replica {} resuming interrupted operation {:?}",
                self.replica_id,
                recovered.operation_id
            );
            state.pending = Some(recovered);
        }

        let operation_id = decision.operation_id.unwrap_or_default();

        let request = match state.pending.take() {
            Some(request) if request.operation_id == Some(operation_id) => request,
            Some(other) => {
                tracing::warn!(
                    "Replica {} got {} for operation {} while {:?} is pending",
                    self.replica_id,
                    decision.msg_type,
                    operation_id,
                    other.operation_id
                );
                state.pending = Some(other);
                return Some(KvMessage::ack(operation_id));
            }
            None => {
                tracing::debug!(
                    "Replica {} already resolved operation {}",
                    self.replica_id,
                    operation_id
                );
                return Some(KvMessage::ack(operation_id));
            }
        };

        // Logged before applied. On failure the request stays pending for the retry.
        if let Err(e) = log.append(&decision) {
            tracing::error!(
                "Replica {} could not log {} for operation {}: {}",
                self.replica_id,
                decision.msg_type,
                operation_id,
                e
            );
            state.pending = Some(request);
            return Some(KvMessage::from_error(&e));
        }

        if decision.msg_type == MessageType::Commit
            && let Err(e) = self.apply(&request).await
        {
            tracing::error!(
                "Replica {} failed to apply committed operation {}: {}",
                self.replica_id,
                operation_id,
                e
            );
            panic!(
                "replica {} cannot apply committed operation {}: {}",
                self.replica_id, operation_id, e
            );
        }

        tracing::debug!(
            "Replica {} {} operation {}",
            self.replica_id,
            if decision.msg_type == MessageType::Commit { "committed" } else { "aborted" },
            operation_id
        );
        Some(KvMessage::ack(operation_id))
    }

    async fn apply(&self, request: &KvMessage) -> KvResult<()> {
        let key = request.key.as_deref().unwrap_or_default();
        match request.msg_type {
            MessageType::PutRequest => {
                self.server
                    .put(key, request.value.as_deref().unwrap_or_default())
                    .await
            }
            MessageType::DeleteRequest => self.server.del(key).await,
            other => Err(KvError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Announces `info` to the coordinator's registration port.
pub async fn register_with_master(
    master_addr: &str,
    info: &ReplicaInfo,
    timeout: Duration,
) -> KvResult<()> {
    let reply = transport::request(master_addr, &KvMessage::register(info.to_string()), timeout).await?;

    if reply.is_success() {
        tracing::info!("Registered replica {} with master {}", info, master_addr);
        Ok(())
    } else {
        Err(KvError::Network(format!(
            "Registration with {} rejected: {}",
            master_addr,
            reply.message.unwrap_or_default()
        )))
    }
}
