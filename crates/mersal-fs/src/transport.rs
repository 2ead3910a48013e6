//! A filesystem transport: one directory per address, one JSON file per
//! queued message, named so lexicographic order is delivery order.
//!
//! Grounded on the source's `FileSystemTransport`: the `{nanos:020d}_{hex}`
//! filename scheme guarantees files sort in send order even across
//! multiple producers, without a separate index file.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mersal_core::error::{Error, Result};
use mersal_core::transport::Transport;
use mersal_types::{OutgoingMessage, TransportMessage};
use uuid::Uuid;

fn to_transient(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Transient(anyhow::Error::new(err))
}

fn message_file_name() -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_nanos();
    format!("{:020}_{}.json", nanos, Uuid::new_v4().simple())
}

/// A transport whose queues are directories under `base_dir`, one file per
/// queued message.
pub struct FileSystemTransport {
    base_dir: PathBuf,
}

impl FileSystemTransport {
    /// Build a transport rooted at `base_dir`. The directory is created
    /// lazily as addresses are used.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn queue_dir(&self, address: &str) -> PathBuf {
        self.base_dir.join(address)
    }

    async fn earliest_file(dir: &Path) -> Result<Option<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(to_transient)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(to_transient)? {
            if entry.file_type().await.map_err(to_transient)?.is_file() {
                names.push(entry.path());
            }
        }
        names.sort();
        Ok(names.into_iter().next())
    }

    async fn write_message(&self, address: &str, message: &TransportMessage) -> Result<()> {
        let dir = self.queue_dir(address);
        tokio::fs::create_dir_all(&dir).await.map_err(to_transient)?;
        let path = dir.join(message_file_name());
        let json = serde_json::to_vec_pretty(message).map_err(|e| to_transient(e))?;
        tokio::fs::write(path, json).await.map_err(to_transient)
    }
}

#[async_trait]
impl Transport for FileSystemTransport {
    async fn create_queue(&self, address: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.queue_dir(address)).await.map_err(to_transient)
    }

    async fn receive(&self, address: &str) -> Result<Option<TransportMessage>> {
        let dir = self.queue_dir(address);
        if !dir.exists() {
            return Ok(None);
        }
        let Some(path) = Self::earliest_file(&dir).await? else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path).await.map_err(to_transient)?;
        let message: TransportMessage = serde_json::from_slice(&bytes).map_err(|e| to_transient(e))?;
        tokio::fs::remove_file(&path).await.map_err(to_transient)?;
        Ok(Some(message))
    }

    async fn send(&self, destination: &str, message: TransportMessage) -> Result<()> {
        self.write_message(destination, &message).await
    }

    async fn send_outgoing_messages(&self, messages: Vec<OutgoingMessage>) -> Result<()> {
        for message in messages {
            self.write_message(&message.destination_address, &message.transport_message).await?;
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
    async fn messages_are_received_in_the_order_they_were_sent() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileSystemTransport::new(dir.path());
        transport.send("orders", message()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        transport.send("orders", message()).await.unwrap();

        let first = transport.receive("orders").await.unwrap();
        let second = transport.receive("orders").await.unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(transport.receive("orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_on_unknown_address_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileSystemTransport::new(dir.path());
        assert!(transport.receive("never-used").await.unwrap().is_none());
    }
}
