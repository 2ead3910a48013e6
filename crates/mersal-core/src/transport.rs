//! The transport seam: how transport messages actually move between queues
//! (spec §4.7).

use async_trait::async_trait;
use mersal_types::{OutgoingMessage, TransportMessage};

use crate::error::Result;

/// Moves [`TransportMessage`]s between named addresses.
///
/// Implementations own delivery and durability; `mersal-core` only relies on
/// the contract that a message handed to [`Transport::send_outgoing_messages`]
/// eventually becomes visible to a [`Transport::receive`] call against the
/// matching address (spec §4.7, "Invariants").
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ensure `address` exists as a receivable queue, creating it if the
    /// backend requires explicit provisioning. A no-op for backends that
    /// create queues implicitly on first send.
    async fn create_queue(&self, address: &str) -> Result<()>;

    /// Receive the next message waiting on `address`, if any. Must not
    /// block past returning `None` when nothing is available; callers that
    /// want to wait poll again after a delay.
    async fn receive(&self, address: &str) -> Result<Option<TransportMessage>>;

    /// Deliver one message directly to `destination`, bypassing any
    /// transaction's outgoing batch. Used by callers sending outside of a
    /// message-processing transaction (e.g. application startup).
    async fn send(&self, destination: &str, message: TransportMessage) -> Result<()>;

    /// Deliver a batch of already-addressed outgoing messages, as flushed by
    /// a transaction's `on_commit` hook (spec §4.6). Implementations should
    /// make a best effort at all-or-nothing delivery, but `mersal-core` does
    /// not depend on that guarantee across process crashes.
    async fn send_outgoing_messages(&self, messages: Vec<OutgoingMessage>) -> Result<()>;
}
