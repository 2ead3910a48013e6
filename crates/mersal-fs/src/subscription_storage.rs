//! Filesystem subscription storage: one JSON file per topic holding a
//! sorted array of subscriber addresses.
//!
//! Grounded on the source's `FileSystemSubscriptionStorage`. Each topic
//! file is rewritten in full on every change; this storage is centralized
//! (spec §4.8) in that every subscriber/publisher reads and writes the same
//! file per topic, rather than each subscriber owning its own file.

use std::path::PathBuf;

use async_trait::async_trait;
use mersal_core::error::{Error, Result};
use mersal_core::subscription::SubscriptionStorage;

fn to_transient(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Transient(anyhow::Error::new(err))
}

/// Subscription storage backed by one JSON file per topic under `base_dir`.
pub struct FileSystemSubscriptionStorage {
    base_dir: PathBuf,
}

impl FileSystemSubscriptionStorage {
    /// Build storage rooted at `base_dir`, created lazily on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, topic: &str) -> PathBuf {
        self.base_dir.join(format!("{topic}.json"))
    }

    async fn read(&self, topic: &str) -> Result<Vec<String>> {
        let path = self.path_for(topic);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(path).await.map_err(to_transient)?;
        serde_json::from_slice(&bytes).map_err(to_transient)
    }

    async fn write(&self, topic: &str, mut addresses: Vec<String>) -> Result<()> {
        addresses.sort();
        addresses.dedup();
        tokio::fs::create_dir_all(&self.base_dir).await.map_err(to_transient)?;
        let bytes = serde_json::to_vec_pretty(&addresses).map_err(to_transient)?;
        tokio::fs::write(self.path_for(topic), bytes).await.map_err(to_transient)
    }
}

#[async_trait]
impl SubscriptionStorage for FileSystemSubscriptionStorage {
    async fn get_subscriber_addresses(&self, topic: &str) -> Result<Vec<String>> {
        self.read(topic).await
    }

    async fn register_subscriber(&self, topic: &str, address: &str) -> Result<()> {
        let mut addresses = self.read(topic).await?;
        if !addresses.iter().any(|a| a == address) {
            addresses.push(address.to_string());
        }
        self.write(topic, addresses).await
    }

    async fn unregister_subscriber(&self, topic: &str, address: &str) -> Result<()> {
        let mut addresses = self.read(topic).await?;
        addresses.retain(|a| a != address);
        self.write(topic, addresses).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_list_is_stored_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemSubscriptionStorage::new(dir.path());
        storage.register_subscriber("orders", "b").await.unwrap();
        storage.register_subscriber("orders", "a").await.unwrap();
        storage.register_subscriber("orders", "a").await.unwrap();

        let addresses = storage.get_subscriber_addresses("orders").await.unwrap();
        assert_eq!(addresses, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn unregister_removes_the_address() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemSubscriptionStorage::new(dir.path());
        storage.register_subscriber("orders", "a").await.unwrap();
        storage.unregister_subscriber("orders", "a").await.unwrap();
        assert!(storage.get_subscriber_addresses("orders").await.unwrap().is_empty());
    }
}
