//! In-process transport, shared by every manager holding a clone.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::membership::transport::{PayloadHandler, Transport, TransportError};

/// Every subscriber owns an unbounded queue, so a slow reader never loses announcements.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    topics: Arc<DashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        // No subscribers yet is not a delivery failure.
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: PayloadHandler) -> Result<(), TransportError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.topics.entry(topic.to_string()).or_default().push(tx);

        let topic = topic.to_string();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                handler(payload);
            }
            tracing::debug!(topic = %topic, "Memory bus subscriber stopped");
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn every_subscriber_receives_each_payload() {
        let bus = MemoryBus::new();
        let (tx, mut rx) = unbounded_channel();

        for name in ["first", "second"] {
            let tx = tx.clone();
            let handler: PayloadHandler = Arc::new(move |payload| {
                let _ = tx.send((name, payload));
            });
            bus.subscribe("events", handler).await.unwrap();
        }
        bus.publish("other", b"ignored".to_vec()).await.unwrap();
        bus.publish("events", b"hello".to_vec()).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..2 {
            let (name, payload) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(payload, b"hello".to_vec());
            received.push(name);
        }
        received.sort();
        assert_eq!(received, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn bursts_are_delivered_without_loss() {
        let bus = MemoryBus::new();
        let (tx, mut rx) = unbounded_channel();
        let handler: PayloadHandler = Arc::new(move |payload| {
            let _ = tx.send(payload);
        });
        bus.subscribe("events", handler).await.unwrap();
        assert_eq!(bus.subscriber_count("events"), 1);

        // The reader task has not run yet; everything queues up behind it.
        for i in 0..2_000u32 {
            bus.publish("events", i.to_be_bytes().to_vec()).await.unwrap();
        }

        for i in 0..2_000u32 {
            let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(payload, i.to_be_bytes().to_vec());
        }
    }
}
