//! Peer-to-peer TCP transport.
//!
//! # Wire Format
//! One connection per delivery, carrying newline-delimited JSON envelopes:
//! ```text
//! {"topic":"replica-proxy.membership","payload":[123,34,...]}\n
//! ```
//!
//! # Design Decisions
//! - Every peer is contacted concurrently; one slow peer does not delay others
//! - Failed deliveries are retried with jittered exponential backoff

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::MembershipConfig;
use crate::membership::transport::{PayloadHandler, Transport, TransportError};
use crate::resilience::RetryPolicy;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    topic: String,
    payload: Vec<u8>,
}

type Subscribers = Arc<DashMap<String, Vec<PayloadHandler>>>;

#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub bind_address: SocketAddr,
    pub peers: Vec<SocketAddr>,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl TcpTransportConfig {
    pub fn new(bind_address: SocketAddr, peers: Vec<SocketAddr>) -> Self {
        Self {
            bind_address,
            peers,
            connect_timeout: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_membership(config: &MembershipConfig) -> Result<Self, TransportError> {
        let bind = config
            .bind_address
            .as_deref()
            .ok_or_else(|| invalid_input("membership.bind_address is required".to_string()))?;
        let bind_address = parse_addr(bind)?;
        let peers = config
            .peers
            .iter()
            .map(|p| parse_addr(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bind_address,
            peers,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            retry: RetryPolicy::new(
                config.publish_attempts,
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        })
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, TransportError> {
    value
        .parse()
        .map_err(|e| invalid_input(format!("invalid address '{}': {}", value, e)))
}

fn invalid_input(message: String) -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
}

pub struct TcpTransport {
    config: TcpTransportConfig,
    subscribers: Subscribers,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind the listener and start accepting envelopes until `shutdown` fires.
    pub async fn bind(config: TcpTransportConfig, shutdown: broadcast::Receiver<()>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        let subscribers: Subscribers = Arc::new(DashMap::new());

        tokio::spawn(accept_loop(listener, Arc::clone(&subscribers), shutdown));
        tracing::info!(address = %local_addr, peers = config.peers.len(), "Membership transport listening");

        Ok(Self {
            config,
            subscribers,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn deliver(&self, peer: SocketAddr, frame: &[u8]) -> Result<(), TransportError> {
        self.config.retry.run(peer, || self.send_once(peer, frame)).await
    }

    async fn send_once(&self, peer: SocketAddr, frame: &[u8]) -> Result<(), TransportError> {
        let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.write_all(frame).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("local_addr", &self.local_addr)
            .field("peers", &self.config.peers)
            .field("topics", &self.subscribers.len())
            .finish()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut frame = serde_json::to_vec(&Envelope {
            topic: topic.to_string(),
            payload,
        })?;
        frame.push(b'\n');

        let results = join_all(self.config.peers.iter().map(|peer| self.deliver(*peer, &frame))).await;

        let mut failed = 0;
        for (peer, result) in self.config.peers.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(peer = %peer, error = %e, "Membership peer unreachable");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(TransportError::Undelivered {
                failed,
                total: self.config.peers.len(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: PayloadHandler) -> Result<(), TransportError> {
        self.subscribers.entry(topic.to_string()).or_default().push(handler);
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, subscribers: Subscribers, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let subscribers = Arc::clone(&subscribers);
                    tokio::spawn(async move {
                        if let Err(e) = read_envelopes(stream, &subscribers).await {
                            tracing::debug!(peer = %peer, error = %e, "Membership connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept membership connection");
                }
            },
            _ = shutdown.recv() => {
                tracing::info!("Membership listener received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

async fn read_envelopes(stream: TcpStream, subscribers: &DashMap<String, Vec<PayloadHandler>>) -> Result<(), TransportError> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope: Envelope = serde_json::from_str(&line)?;
        let handlers: Vec<PayloadHandler> = subscribers
            .get(&envelope.topic)
            .map(|h| h.value().clone())
            .unwrap_or_default();
        for handler in handlers {
            handler(envelope.payload.clone());
        }
    }
    Ok(())
}
