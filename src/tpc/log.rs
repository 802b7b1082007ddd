//! Durable write-ahead log of a participant's 2PC steps.
//!
//! The log keeps the whole history in memory and rewrites it to disk on every
//! accepted append: encode to a sibling temp file, fsync, then rename over the
//! real file. A crash therefore leaves either the old or the new sequence on
//! disk, never a torn one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KvResult;
use crate::network::protocol::{KvMessage, MessageType};
use crate::storage::server::KeyServer;

/// One persisted step. Every field is always encoded so the record stays
/// readable by a non-self-describing format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: MessageType,
    pub key: Option<String>,
    pub value: Option<String>,
    pub operation_id: Option<u64>,
}

impl LogEntry {
    pub fn is_loggable(kind: MessageType) -> bool {
        matches!(
            kind,
            MessageType::PutRequest
                | MessageType::DeleteRequest
                | MessageType::Ready
                | MessageType::Abort
                | MessageType::Commit
        )
    }

    pub fn to_message(&self) -> KvMessage {
        KvMessage {
            key: self.key.clone(),
            value: self.value.clone(),
            operation_id: self.operation_id,
            ..KvMessage::new(self.kind)
        }
    }
}

impl From<&KvMessage> for LogEntry {
    fn from(message: &KvMessage) -> Self {
        Self {
            kind: message.msg_type,
            key: message.key.clone(),
            value: message.value.clone(),
            operation_id: message.operation_id,
        }
    }
}

pub struct RecoveryLog {
    path: PathBuf,
    entries: Vec<LogEntry>,
    interrupted: Option<KvMessage>,
}

impl RecoveryLog {
    /// Opens the log at `path`, loading whatever a previous run left there.
    /// A missing file is an empty log.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                Vec::new()
            } else {
                bincode::deserialize(&bytes)?
            }
        } else {
            Vec::new()
        };

        tracing::info!("Opened recovery log {} ({} entries)", path.display(), entries.len());

        Ok(Self {
            path,
            entries,
            interrupted: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `message` and persists the full log before returning.
    ///
    /// Only 2PC steps are recorded; anything else is skipped and reported as
    /// `Ok(false)`. On a write failure the in-memory log is left unchanged.
    pub fn append(&mut self, message: &KvMessage) -> KvResult<bool> {
        if !LogEntry::is_loggable(message.msg_type) {
            tracing::debug!("Not logging {} message", message.msg_type);
            return Ok(false);
        }

        self.entries.push(LogEntry::from(message));
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }

        Ok(true)
    }

    fn persist(&self) -> KvResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let bytes = bincode::serialize(&self.entries)?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Replays the log into `server`.
    ///
    /// A commit applies the most recent unresolved request and an abort drops
    /// it. Whatever request is still unresolved at the end becomes the
    /// interrupted operation. Returns the number of operations applied.
    pub async fn rebuild(&mut self, server: &KeyServer) -> KvResult<usize> {
        let mut pending: Option<&LogEntry> = None;
        let mut applied = 0;

        for entry in &self.entries {
            match entry.kind {
                MessageType::PutRequest | MessageType::DeleteRequest => {
                    if let Some(previous) = pending {
                        tracing::warn!(
                            "Operation {:?} was never decided, superseded by {:?}",
                            previous.operation_id,
                            entry.operation_id
                        );
                    }
                    pending = Some(entry);
                }
                MessageType::Commit => match pending.take() {
                    Some(request) => {
                        if request.operation_id != entry.operation_id {
                            tracing::warn!(
                                "Commit for {:?} applied to pending operation {:?}",
                                entry.operation_id,
                                request.operation_id
                            );
                        }
                        apply(server, request).await?;
                        applied += 1;
                    }
                    None => {
                        tracing::debug!("Commit {:?} with nothing pending", entry.operation_id);
                    }
                },
                MessageType::Abort => {
                    pending = None;
                }
                _ => {}
            }
        }

        self.interrupted = pending.map(LogEntry::to_message);

        match &self.interrupted {
            Some(op) => tracing::warn!(
                "Recovery log {} ends with undecided operation {:?}",
                self.path.display(),
                op.operation_id
            ),
            None => tracing::info!(
                "Rebuilt {} operations from {}",
                applied,
                self.path.display()
            ),
        }

        Ok(applied)
    }

    /// Hands out the request left undecided by the last rebuild, once.
    pub fn get_interrupted_operation(&mut self) -> Option<KvMessage> {
        self.interrupted.take()
    }

    pub fn has_interrupted_operation(&self) -> bool {
        self.interrupted.is_some()
    }
}

async fn apply(server: &KeyServer, request: &LogEntry) -> KvResult<()> {
    let key = request.key.as_deref().unwrap_or_default();

    match request.kind {
        MessageType::PutRequest => {
            let value = request.value.as_deref().unwrap_or_default();
            server.put(key, value).await
        }
        MessageType::DeleteRequest => match server.del(key).await {
            Err(e) if e.is_not_found() => {
                tracing::warn!("Replayed delete of missing key {}", key);
                Ok(())
            }
            other => other,
        },
        _ => Ok(()),
    }
}
