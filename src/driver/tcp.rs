//! Reachability-only connector.
//!
//! Opens a TCP connection to the replica's host and port. It cannot speak any
//! database protocol, so `execute` only checks that the socket is still writable.
//! Used by the supervisor binary, whose only native work is health probing.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::driver::{Connector, NativeError, NativeHandle, Session};
use crate::replica::Replica;

/// Connector that treats "accepts TCP connections" as "alive".
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, replica: &Replica) -> Result<Box<dyn Session>, NativeError> {
        let addr = replica
            .socket_addr()
            .ok_or_else(|| format!("replica '{}' has no host:port in {}", replica, replica.location()))?;

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| format!("connect to {} timed out", addr))??;

        tracing::trace!(replica = %replica, addr = %addr, "TCP session opened");
        Ok(Box::new(TcpSession {
            stream: Mutex::new(Some(stream)),
        }))
    }
}

struct TcpSession {
    stream: Mutex<Option<TcpStream>>,
}

#[async_trait]
impl NativeHandle for TcpSession {
    async fn close(&self) -> Result<(), NativeError> {
        if let Some(mut stream) = self.stream.lock().await.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn execute(&self, _statement: &str) -> Result<u64, NativeError> {
        let guard = self.stream.lock().await;
        let stream = guard.as_ref().ok_or("session closed")?;
        stream.writable().await?;
        stream.peer_addr()?;
        Ok(0)
    }

    async fn query(&self, statement: &str) -> Result<Vec<String>, NativeError> {
        self.execute(statement).await.map(|_| Vec::new())
    }
}
