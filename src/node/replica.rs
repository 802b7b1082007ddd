use anyhow::{Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ReplicaConfig;
use crate::network::server::SocketServer;
use crate::storage::server::KeyServer;
use crate::tpc::log::RecoveryLog;
use crate::tpc::participant::{ParticipantHandler, register_with_master};
use crate::tpc::ring::ReplicaInfo;

/// A running replica: its key server, rebuilt from the recovery log, served
/// to the master through a participant socket server.
pub struct ReplicaNode {
    info: ReplicaInfo,
    participant: Arc<ParticipantHandler>,
    task: JoinHandle<()>,
}

impl ReplicaNode {
    pub async fn start(config: &ReplicaConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        // 1. Storage and recovery:
        let server = Arc::new(KeyServer::new(
            config.cache.num_sets,
            config.cache.max_elems_per_set,
            config.store_latency(),
        ));
        if let Some(snapshot) = &config.snapshot_path
            && snapshot.exists()
        {
            server.restore_from_file(snapshot).await?;
            tracing::info!("Replica {} restored store from {}", config.id, snapshot.display());
        }
        let mut log = RecoveryLog::open(&config.log_path)?;
        let applied = log.rebuild(&server).await?;
        tracing::info!(
            "Replica {} recovered {} operations from {}",
            config.id,
            applied,
            config.log_path.display()
        );

        let participant = Arc::new(ParticipantHandler::new(
            config.id,
            server,
            Arc::new(Mutex::new(log)),
        ));

        // 2. Participant server:
        let socket = SocketServer::bind(
            &format!("replica-{}", config.id),
            &config.bind_addr,
            config.workers,
            config.timeout(),
        )
        .await?;
        let info = ReplicaInfo::new(config.id, &config.advertise_host, socket.local_addr()?.port());
        let task = socket.spawn(participant.clone().into_handler());

        // 3. Join the ring:
        if let Err(e) = register_with_master(&config.master_addr, &info, config.timeout()).await {
            task.abort();
            return Err(e.into());
        }

        Ok(Self {
            info,
            participant,
            task,
        })
    }

    pub fn info(&self) -> &ReplicaInfo {
        &self.info
    }

    pub fn participant(&self) -> &Arc<ParticipantHandler> {
        &self.participant
    }

    /// Writes the backing store to `path`; a later start with it as
    /// `snapshot_path` begins from this state.
    pub async fn dump_snapshot(&self, path: &Path) -> Result<()> {
        self.participant.server().dump_to_file(path).await?;
        tracing::info!("Replica {} dumped store to {}", self.info.id, path.display());
        Ok(())
    }

    /// Resolves when the participant server stops on its own.
    pub async fn stopped(&mut self) -> Result<()> {
        (&mut self.task).await?;
        Ok(())
    }

    pub async fn wait(self) -> Result<()> {
        self.task.await?;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}
