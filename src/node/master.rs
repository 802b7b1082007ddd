use anyhow::{Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::api;
use crate::config::CoordinatorConfig;
use crate::network::server::SocketServer;
use crate::tpc::coordinator::Coordinator;

/// A running master: the registration socket server plus the client HTTP API,
/// both backed by one [`Coordinator`].
pub struct MasterNode {
    coordinator: Arc<Coordinator>,
    registration_addr: SocketAddr,
    http_addr: SocketAddr,
    registration_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
}

impl MasterNode {
    pub async fn start(config: &CoordinatorConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let coordinator = Arc::new(
            Coordinator::new(
                config.cache.num_sets,
                config.cache.max_elems_per_set,
                config.timeout(),
            )
            .with_retry_backoff(config.retry_initial(), config.retry_max()),
        );

        // 1. Registration port:
        let registration = SocketServer::bind(
            "registration",
            &config.registration_addr,
            config.workers,
            config.timeout(),
        )
        .await?;
        let registration_addr = registration.local_addr()?;
        let registration_task = registration.spawn(coordinator.clone().into_registration_handler());

        // 2. HTTP API:
        let app = api::router(coordinator.clone());
        let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
        let http_addr = listener.local_addr()?;
        tracing::info!("HTTP server listening on {}", http_addr);

        let http_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("HTTP server stopped: {}", e);
            }
        });

        Ok(Self {
            coordinator,
            registration_addr,
            http_addr,
            registration_task,
            http_task,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn registration_addr(&self) -> SocketAddr {
        self.registration_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Runs until either server stops.
    pub async fn wait(self) -> Result<()> {
        tokio::select! {
            res = self.registration_task => res?,
            res = self.http_task => res?,
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.registration_task.abort();
        self.http_task.abort();
    }
}
