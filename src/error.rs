//! Error taxonomy shared by every layer of the store.
//!
//! Each variant carries the human-readable text that ends up in a `response`
//! message when the error crosses the wire, so a remote caller sees the same
//! message the local layer produced.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("Oversized key")]
    OversizedKey,

    #[error("Oversized value")]
    OversizedValue,

    #[error("{0}")]
    NotFound(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("{0}")]
    IgnoredOperation(String),

    /// A 2PC operation that at least one replica refused. The message holds
    /// every replica's reason, prefixed by its id.
    #[error("{0}")]
    Aborted(String),

    #[error("Not enough replicas registered: need 2, have {registered}")]
    InsufficientReplicas { registered: usize },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl KvError {
    /// The canonical "key missing" error raised by the backing store.
    pub fn does_not_exist() -> Self {
        KvError::NotFound("Does not exist".to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound(_))
    }
}

impl From<std::io::Error> for KvError {
    fn from(err: std::io::Error) -> Self {
        KvError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Storage(err.to_string())
    }
}

pub type KvResult<T> = std::result::Result<T, KvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_match_wire_text() {
        assert_eq!(KvError::OversizedKey.to_string(), "Oversized key");
        assert_eq!(KvError::OversizedValue.to_string(), "Oversized value");
        assert_eq!(KvError::does_not_exist().to_string(), "Does not exist");
        assert_eq!(
            KvError::InsufficientReplicas { registered: 1 }.to_string(),
            "Not enough replicas registered: need 2, have 1"
        );
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: KvError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(matches!(err, KvError::Storage(ref msg) if msg.contains("disk gone")));
        assert!(!err.is_not_found());
    }
}
