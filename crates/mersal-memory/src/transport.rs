//! An in-process transport backed by one FIFO queue per address.
//!
//! Grounded on the same `Arc<RwLock<HashMap<...>>>` shape the teacher uses
//! for its in-memory event store (`toka-store-memory`), adapted here from a
//! single append-only log to one queue per address.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use mersal_core::error::Result;
use mersal_core::transport::Transport;
use mersal_types::{OutgoingMessage, TransportMessage};
use tokio::sync::RwLock;

/// A transport whose queues live entirely in process memory. Every
/// `InMemoryTransport` handle sharing the same `Arc` sees the same queues;
/// nothing here is durable across a process restart.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    queues: Arc<RwLock<HashMap<String, VecDeque<TransportMessage>>>>,
}

impl InMemoryTransport {
    /// Build an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently queued at `address`, for test assertions.
    pub async fn queue_len(&self, address: &str) -> usize {
        self.queues.read().await.get(address).map(VecDeque::len).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn create_queue(&self, address: &str) -> Result<()> {
        self.queues.write().await.entry(address.to_string()).or_default();
        Ok(())
    }

    async fn receive(&self, address: &str) -> Result<Option<TransportMessage>> {
        Ok(self.queues.write().await.entry(address.to_string()).or_default().pop_front())
    }

    async fn send(&self, destination: &str, message: TransportMessage) -> Result<()> {
        self.queues.write().await.entry(destination.to_string()).or_default().push_back(message);
        Ok(())
    }

    async fn send_outgoing_messages(&self, messages: Vec<OutgoingMessage>) -> Result<()> {
        let mut queues = self.queues.write().await;
        for message in messages {
            queues.entry(message.destination_address).or_default().push_back(message.transport_message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mersal_types::{MessageHeaders, TransportBody};

    fn message() -> TransportMessage {
        TransportMessage::new(MessageHeaders::new(), TransportBody::Str { body: "hi".to_string() })
    }

    #[tokio::test]
    async fn receive_returns_messages_in_fifo_order() {
        let transport = InMemoryTransport::new();
        transport.send("queue-a", message()).await.unwrap();
        transport.send("queue-a", message()).await.unwrap();

        assert_eq!(transport.queue_len("queue-a").await, 2);
        assert!(transport.receive("queue-a").await.unwrap().is_some());
        assert_eq!(transport.queue_len("queue-a").await, 1);
    }

    #[tokio::test]
    async fn receive_on_empty_queue_returns_none() {
        let transport = InMemoryTransport::new();
        transport.create_queue("queue-a").await.unwrap();
        assert!(transport.receive("queue-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_outgoing_messages_fans_out_to_their_own_addresses() {
        let transport = InMemoryTransport::new();
        let batch = vec![
            OutgoingMessage::new("queue-a", message()),
            OutgoingMessage::new("queue-b", message()),
        ];
        transport.send_outgoing_messages(batch).await.unwrap();
        assert_eq!(transport.queue_len("queue-a").await, 1);
        assert_eq!(transport.queue_len("queue-b").await, 1);
    }
}
