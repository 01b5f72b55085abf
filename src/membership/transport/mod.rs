//! Publish/subscribe transports for membership announcements.

pub mod memory;
pub mod tcp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Callback invoked with each payload received on a topic.
pub type PayloadHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("envelope encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("delivery to {failed} of {total} peers failed")]
    Undelivered { failed: usize, total: usize },

    #[error("transport is closed")]
    Closed,
}

/// Delivers opaque payloads to every subscriber of a topic, in any process.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str, handler: PayloadHandler) -> Result<(), TransportError>;
}
