//! Socket Server
//!
//! Accepts connections on one listening address and hands each of them to a
//! bounded pool of workers. Every worker reads one framed message, passes it
//! to the registered handler and writes the handler's reply (if any) back.
//!
//! ## Responsibilities
//! - **Accepting**: a single accept loop per listening role (registration,
//!   participant traffic).
//! - **Bounding**: at most `max_workers` connections are serviced at once; the
//!   accept loop waits for a free worker before taking the next connection.
//! - **Error replies**: a frame that cannot be decoded is answered with an
//!   error `response` instead of tearing down the server.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::protocol::KvMessage;
use super::transport::{receive_message, send_message};

/// Type alias for an asynchronous message handler.
///
/// Returning `None` closes the connection without a reply.
pub type MessageHandlerFn =
    Arc<dyn Fn(KvMessage) -> Pin<Box<dyn Future<Output = Option<KvMessage>> + Send>> + Send + Sync>;

/// Wraps an async closure into a [`MessageHandlerFn`].
pub fn handler_fn<F, Fut>(handler: F) -> MessageHandlerFn
where
    F: Fn(KvMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<KvMessage>> + Send + 'static,
{
    Arc::new(move |message: KvMessage| {
        Box::pin(handler(message)) as Pin<Box<dyn Future<Output = Option<KvMessage>> + Send>>
    })
}

pub struct SocketServer {
    name: String,
    listener: TcpListener,
    workers: Arc<Semaphore>,
    max_workers: usize,
    read_timeout: Duration,
}

impl SocketServer {
    pub async fn bind(
        name: &str,
        addr: &str,
        max_workers: usize,
        read_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let max_workers = max_workers.max(1);

        tracing::info!(
            "{} server listening on {} ({} workers)",
            name,
            listener.local_addr()?,
            max_workers
        );

        Ok(Self {
            name: name.to_string(),
            listener,
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs the accept loop on a background task.
    pub fn spawn(self, handler: MessageHandlerFn) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(handler).await;
        })
    }

    pub async fn run(self, handler: MessageHandlerFn) {
        loop {
            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("{} worker pool closed, stopping", self.name);
                    return;
                }
            };

            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("{} failed to accept connection: {}", self.name, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let handler = handler.clone();
            let name = self.name.clone();
            let read_timeout = self.read_timeout;

            tokio::spawn(async move {
                serve_connection(&name, stream, peer, handler, read_timeout).await;
                drop(permit);
            });
        }
    }
}

async fn serve_connection(
    name: &str,
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: MessageHandlerFn,
    read_timeout: Duration,
) {
    let reply = match receive_message(&mut stream, read_timeout).await {
        Ok(message) => {
            tracing::debug!("{} received {} from {}", name, message.msg_type, peer);
            handler(message).await
        }
        Err(e) => {
            tracing::warn!("{} rejected message from {}: {}", name, peer, e);
            Some(KvMessage::from_error(&e))
        }
    };

    match reply {
        Some(reply) => {
            if let Err(e) = send_message(&mut stream, &reply).await {
                tracing::warn!("{} failed to reply to {}: {}", name, peer, e);
            }
        }
        None => {
            tracing::debug!("{} closing connection from {} without reply", name, peer);
        }
    }
}
