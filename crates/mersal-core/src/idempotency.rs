//! At-most-once delivery tracking (spec §4.6 / §9 scenario A).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Records which message ids have already been fully processed, so the
/// idempotency step can recognize a redelivered message and suppress its
/// handlers instead of invoking them a second time.
#[async_trait]
pub trait MessageTracker: Send + Sync {
    /// Whether `message_id` has already been marked as tracked.
    async fn is_tracked(&self, message_id: Uuid) -> Result<bool>;

    /// Mark `message_id` as processed. Called from an `on_commit` hook so a
    /// rolled-back message is never marked tracked (spec §4.6).
    async fn track(&self, message_id: Uuid) -> Result<()>;
}
