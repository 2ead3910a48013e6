//! An in-process, centralized subscription storage: one shared map from
//! topic to subscriber addresses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use mersal_core::error::Result;
use mersal_core::subscription::SubscriptionStorage;
use tokio::sync::RwLock;

/// Subscription storage backed by an in-memory `topic -> addresses` map.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStorage {
    topics: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemorySubscriptionStorage {
    /// Build empty subscription storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStorage for InMemorySubscriptionStorage {
    async fn get_subscriber_addresses(&self, topic: &str) -> Result<Vec<String>> {
        Ok(self.topics.read().await.get(topic).map(|set| set.iter().cloned().collect()).unwrap_or_default())
    }

    async fn register_subscriber(&self, topic: &str, address: &str) -> Result<()> {
        self.topics.write().await.entry(topic.to_string()).or_default().insert(address.to_string());
        Ok(())
    }

    async fn unregister_subscriber(&self, topic: &str, address: &str) -> Result<()> {
        if let Some(addresses) = self.topics.write().await.get_mut(topic) {
            addresses.remove(address);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribing_twice_is_idempotent() {
        let storage = InMemorySubscriptionStorage::new();
        storage.register_subscriber("orders", "addr-1").await.unwrap();
        storage.register_subscriber("orders", "addr-1").await.unwrap();
        let addresses = storage.get_subscriber_addresses("orders").await.unwrap();
        assert_eq!(addresses.len(), 1);
    }

    #[tokio::test]
    async fn unregister_removes_only_the_named_address() {
        let storage = InMemorySubscriptionStorage::new();
        storage.register_subscriber("orders", "addr-1").await.unwrap();
        storage.register_subscriber("orders", "addr-2").await.unwrap();
        storage.unregister_subscriber("orders", "addr-1").await.unwrap();
        let addresses = storage.get_subscriber_addresses("orders").await.unwrap();
        assert_eq!(addresses, vec!["addr-2".to_string()]);
    }
}
