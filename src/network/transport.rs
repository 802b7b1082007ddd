//! Framed request/response exchange over TCP.
//!
//! One connection carries exactly one request and one reply. Each side marks
//! the end of its frame by shutting down its write half, so the reader simply
//! reads to EOF.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::protocol::{KvMessage, MAX_FRAME_SIZE};
use crate::error::{KvError, KvResult};

pub async fn send_message(stream: &mut TcpStream, message: &KvMessage) -> KvResult<()> {
    let bytes = message.to_bytes()?;

    stream
        .write_all(&bytes)
        .await
        .map_err(|e| KvError::Network(format!("Could not send data: {}", e)))?;
    stream
        .shutdown()
        .await
        .map_err(|e| KvError::Network(format!("Could not send data: {}", e)))?;

    Ok(())
}

pub async fn receive_message(stream: &mut TcpStream, timeout: Duration) -> KvResult<KvMessage> {
    let mut buffer = Vec::new();
    let mut limited = stream.take(MAX_FRAME_SIZE + 1);

    match tokio::time::timeout(timeout, limited.read_to_end(&mut buffer)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(KvError::Network(format!("Could not receive data: {}", e))),
        Err(_) => {
            return Err(KvError::Network(format!(
                "Timed out after {:?} waiting for data",
                timeout
            )));
        }
    }

    if buffer.len() as u64 > MAX_FRAME_SIZE {
        return Err(KvError::MalformedMessage(format!(
            "frame exceeds {} bytes",
            MAX_FRAME_SIZE
        )));
    }

    KvMessage::from_slice(&buffer)
}

pub async fn connect(addr: &str, timeout: Duration) -> KvResult<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(KvError::Network(format!("Could not connect to {}: {}", addr, e))),
        Err(_) => Err(KvError::Network(format!("Timed out connecting to {}", addr))),
    }
}

/// Opens a fresh connection to `addr`, sends `message` and waits for the reply.
///
/// The whole exchange is bounded by `timeout`.
pub async fn request(addr: &str, message: &KvMessage, timeout: Duration) -> KvResult<KvMessage> {
    let exchange = async {
        let mut stream = connect(addr, timeout).await?;
        send_message(&mut stream, message).await?;
        receive_message(&mut stream, timeout).await
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(KvError::Network(format!(
            "Timed out after {:?} talking to {}",
            timeout, addr
        ))),
    }
}
