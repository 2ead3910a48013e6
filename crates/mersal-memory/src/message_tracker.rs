//! An in-process message tracker backed by a set of seen message ids.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mersal_core::error::Result;
use mersal_core::idempotency::MessageTracker;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tracks processed message ids in an in-memory set.
#[derive(Clone, Default)]
pub struct InMemoryMessageTracker {
    seen: Arc<RwLock<HashSet<Uuid>>>,
}

impl InMemoryMessageTracker {
    /// Build an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageTracker for InMemoryMessageTracker {
    async fn is_tracked(&self, message_id: Uuid) -> Result<bool> {
        Ok(self.seen.read().await.contains(&message_id))
    }

    async fn track(&self, message_id: Uuid) -> Result<()> {
        self.seen.write().await.insert(message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_tracked_message_is_reported_as_such() {
        let tracker = InMemoryMessageTracker::new();
        let id = Uuid::new_v4();
        assert!(!tracker.is_tracked(id).await.unwrap());
        tracker.track(id).await.unwrap();
        assert!(tracker.is_tracked(id).await.unwrap());
    }
}
