//! Wire Protocol
//!
//! Defines the single tagged message record exchanged between the coordinator,
//! the replicas and anything that registers with them.
//!
//! Every message is one JSON document. Sizes are checked before a message is
//! encoded and again after it is decoded, so an oversized key or value never
//! reaches a store, a log or a socket.

use serde::{Deserialize, Serialize};

use crate::error::{KvError, KvResult};

// --- Limits ---

/// Largest key accepted anywhere in the system, in bytes.
pub const MAX_KEY_SIZE: usize = 256;
/// Largest value accepted anywhere in the system, in bytes.
pub const MAX_VALUE_SIZE: usize = 256 * 1024;
/// Upper bound on a single encoded frame read from a socket.
pub const MAX_FRAME_SIZE: u64 = 1024 * 1024;

/// Reply body used for successful registrations and ignore-next requests.
pub const SUCCESS: &str = "Success";

pub fn validate_key(key: &str) -> KvResult<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(KvError::OversizedKey);
    }
    Ok(())
}

pub fn validate_value(value: &str) -> KvResult<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::OversizedValue);
    }
    Ok(())
}

// --- Message kinds ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    GetRequest,
    PutRequest,
    DeleteRequest,
    Response,
    Ready,
    Commit,
    Abort,
    Ack,
    Register,
    IgnoreNext,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::GetRequest => "get-request",
            MessageType::PutRequest => "put-request",
            MessageType::DeleteRequest => "delete-request",
            MessageType::Response => "response",
            MessageType::Ready => "ready",
            MessageType::Commit => "commit",
            MessageType::Abort => "abort",
            MessageType::Ack => "ack",
            MessageType::Register => "register",
            MessageType::IgnoreNext => "ignore-next",
        }
    }

    pub fn parse(name: &str) -> KvResult<Self> {
        let kind = match name {
            "get-request" => MessageType::GetRequest,
            "put-request" => MessageType::PutRequest,
            "delete-request" => MessageType::DeleteRequest,
            "response" => MessageType::Response,
            "ready" => MessageType::Ready,
            "commit" => MessageType::Commit,
            "abort" => MessageType::Abort,
            "ack" => MessageType::Ack,
            "register" => MessageType::Register,
            "ignore-next" => MessageType::IgnoreNext,
            other => return Err(KvError::UnknownMessageType(other.to_string())),
        };
        Ok(kind)
    }

    /// Phase-1 requests sent by the coordinator.
    pub fn is_phase_one(&self) -> bool {
        matches!(self, MessageType::PutRequest | MessageType::DeleteRequest)
    }

    /// Phase-2 decisions sent by the coordinator.
    pub fn is_decision(&self) -> bool {
        matches!(self, MessageType::Commit | MessageType::Abort)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Message ---

/// A single protocol message.
///
/// Which optional fields must be present depends on `msg_type`; see
/// [`KvMessage::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KvMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<u64>,
}

/// Decoding shape: the type tag is kept as a string so that an unknown kind is
/// reported as `UnknownMessageType` instead of a generic parse failure.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    operation_id: Option<u64>,
}

impl KvMessage {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            key: None,
            value: None,
            message: None,
            operation_id: None,
        }
    }

    pub fn get_request(key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(MessageType::GetRequest)
        }
    }

    pub fn put_request(key: &str, value: &str, operation_id: u64) -> Self {
        Self {
            key: Some(key.to_string()),
            value: Some(value.to_string()),
            operation_id: Some(operation_id),
            ..Self::new(MessageType::PutRequest)
        }
    }

    pub fn delete_request(key: &str, operation_id: u64) -> Self {
        Self {
            key: Some(key.to_string()),
            operation_id: Some(operation_id),
            ..Self::new(MessageType::DeleteRequest)
        }
    }

    /// A `response` carrying free text (status or error).
    pub fn response(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(MessageType::Response)
        }
    }

    /// A `response` carrying a value for a read.
    pub fn value_response(key: &str, value: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            value: Some(value.to_string()),
            ..Self::new(MessageType::Response)
        }
    }

    pub fn from_error(err: &KvError) -> Self {
        Self::response(err.to_string())
    }

    pub fn ready(operation_id: u64) -> Self {
        Self {
            operation_id: Some(operation_id),
            ..Self::new(MessageType::Ready)
        }
    }

    pub fn commit(operation_id: u64) -> Self {
        Self {
            operation_id: Some(operation_id),
            ..Self::new(MessageType::Commit)
        }
    }

    pub fn abort(operation_id: u64, reason: Option<String>) -> Self {
        Self {
            operation_id: Some(operation_id),
            message: reason,
            ..Self::new(MessageType::Abort)
        }
    }

    pub fn ack(operation_id: u64) -> Self {
        Self {
            operation_id: Some(operation_id),
            ..Self::new(MessageType::Ack)
        }
    }

    pub fn register(replica: impl Into<String>) -> Self {
        Self {
            message: Some(replica.into()),
            ..Self::new(MessageType::Register)
        }
    }

    pub fn ignore_next() -> Self {
        Self::new(MessageType::IgnoreNext)
    }

    pub fn is_success(&self) -> bool {
        self.msg_type == MessageType::Response && self.message.as_deref() == Some(SUCCESS)
    }

    /// Checks size bounds and that every field required by the message kind is present.
    pub fn validate(&self) -> KvResult<()> {
        if let Some(key) = &self.key {
            validate_key(key)?;
        }
        if let Some(value) = &self.value {
            validate_value(value)?;
        }

        let missing = |field: &str| {
            KvError::MalformedMessage(format!("{} message without {}", self.msg_type, field))
        };

        match self.msg_type {
            MessageType::GetRequest | MessageType::DeleteRequest => {
                self.key.as_ref().ok_or_else(|| missing("key"))?;
            }
            MessageType::PutRequest => {
                self.key.as_ref().ok_or_else(|| missing("key"))?;
                self.value.as_ref().ok_or_else(|| missing("value"))?;
            }
            MessageType::Response => {
                let carries_value = self.key.is_some() && self.value.is_some();
                if !carries_value && self.message.is_none() {
                    return Err(KvError::MalformedMessage(
                        "response carries neither a value nor a message".to_string(),
                    ));
                }
            }
            MessageType::Ready | MessageType::Commit | MessageType::Abort | MessageType::Ack => {
                self.operation_id.ok_or_else(|| missing("operationId"))?;
            }
            MessageType::Register => {
                self.message.as_ref().ok_or_else(|| missing("message"))?;
            }
            MessageType::IgnoreNext => {}
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> KvResult<Vec<u8>> {
        self.validate()?;
        serde_json::to_vec(self).map_err(|e| KvError::MalformedMessage(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> KvResult<Self> {
        if bytes.is_empty() {
            return Err(KvError::MalformedMessage("empty frame".to_string()));
        }

        let raw: RawMessage =
            serde_json::from_slice(bytes).map_err(|e| KvError::MalformedMessage(e.to_string()))?;

        let message = Self {
            msg_type: MessageType::parse(&raw.msg_type)?,
            key: raw.key,
            value: raw.value,
            message: raw.message,
            operation_id: raw.operation_id,
        };
        message.validate()?;

        Ok(message)
    }
}
