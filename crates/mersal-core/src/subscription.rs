//! Topic subscription storage, centralized or decentralized (spec §4.8).

use async_trait::async_trait;

use crate::error::Result;

/// Tracks which addresses are subscribed to which topics, so a `Publish`
/// dispatch can fan out to every current subscriber.
///
/// A "centralized" implementation stores every topic's subscriber list in
/// one shared backend the whole system writes through; a "decentralized"
/// one lets each subscriber own and publish its own topic file, trading a
/// shared write bottleneck for eventual convergence. `mersal-core` only
/// depends on the read/write contract below; which shape a given
/// implementation picks is a deployment concern (spec §4.8, "Non-goals").
#[async_trait]
pub trait SubscriptionStorage: Send + Sync {
    /// The addresses currently subscribed to `topic`, in no particular
    /// order.
    async fn get_subscriber_addresses(&self, topic: &str) -> Result<Vec<String>>;

    /// Add `address` to `topic`'s subscriber list. Idempotent: subscribing
    /// twice leaves the list unchanged.
    async fn register_subscriber(&self, topic: &str, address: &str) -> Result<()>;

    /// Remove `address` from `topic`'s subscriber list. A no-op if it was
    /// not subscribed.
    async fn unregister_subscriber(&self, topic: &str, address: &str) -> Result<()>;
}
