//! The outgoing pipeline's step context (spec §4.4, outgoing order).

use std::sync::Arc;

use mersal_types::{LogicalMessage, OutgoingMessage};

use crate::context::TransactionContext;

use super::Step;

/// Marker alias: an outgoing-pipeline step operates on
/// `OutgoingStepContext<App>`.
pub trait OutgoingStep<App>: Step<App, OutgoingStepContext<App>> {}
impl<App, T: Step<App, OutgoingStepContext<App>>> OutgoingStep<App> for T {}

/// What the caller asked for when it handed a logical message to the
/// outgoing pipeline: a local in-process dispatch, a point-to-point send to
/// an explicit address, or a topic publish fanning out to every subscriber
/// address on file.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Deliver straight to this process's own handlers, bypassing the
    /// transport entirely.
    SendLocal,
    /// Deliver to one explicit transport address.
    Send {
        /// The destination queue address.
        destination: String,
    },
    /// Deliver to every address currently subscribed to `topic`.
    Publish {
        /// The topic identifier.
        topic: String,
    },
}

/// The batch of [`OutgoingMessage`]s accumulated by the current transaction,
/// stashed in the owning [`TransactionContext`]'s typed items bag under this
/// type so the enqueue step can append to it and the commit hook can drain
/// it (spec §4.6, "items[\"outgoing-messages\"]").
#[derive(Default, Clone)]
pub struct OutgoingMessages(
    /// The accumulated outgoing messages, in the order they were enqueued.
    pub Vec<OutgoingMessage>,
);

/// Carries one logical message through the outgoing pipeline.
pub struct OutgoingStepContext<App> {
    /// The transaction context this send is happening under.
    pub transaction_context: Arc<TransactionContext>,
    /// A handle to the owning application.
    pub app: App,
    /// The message being sent.
    pub logical_message: LogicalMessage,
    /// What the caller asked for.
    pub dispatch: Dispatch,
    /// Resolved destination addresses. Populated by the address-assignment
    /// step: one entry for `Send`, zero-or-more for `Publish`, none for
    /// `SendLocal`.
    pub destination_addresses: Vec<String>,
    /// Serialized transport message, set once the serialize-body step has
    /// run. `None` for a `SendLocal` dispatch, which never touches the wire
    /// format.
    pub transport_message: Option<mersal_types::TransportMessage>,
}

impl<App> OutgoingStepContext<App> {
    /// Start a fresh outgoing-pipeline context for a message about to be
    /// sent.
    pub fn new(logical_message: LogicalMessage, dispatch: Dispatch, transaction_context: Arc<TransactionContext>, app: App) -> Self {
        Self {
            transaction_context,
            app,
            logical_message,
            dispatch,
            destination_addresses: Vec::new(),
            transport_message: None,
        }
    }
}
