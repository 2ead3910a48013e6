//! The incoming pipeline's step context (spec §4.4, incoming order).

use std::sync::Arc;

use mersal_types::{LogicalMessage, TransportMessage};

use crate::activator::HandlerInvokers;
use crate::context::TransactionContext;

use super::Step;

/// Marker alias: an incoming-pipeline step operates on
/// `IncomingStepContext<App>`.
pub trait IncomingStep<App>: Step<App, IncomingStepContext<App>> {}
impl<App, T: Step<App, IncomingStepContext<App>>> IncomingStep<App> for T {}

/// Carries a message through the incoming pipeline. Fields are populated
/// progressively by the standard steps (deserialize attaches
/// `logical_message`, handler resolution attaches `handler_invokers`, ...)
/// rather than through the source's stringly-keyed `context.load(Type)`
/// bag, since Rust can express "this step runs after that one populated
/// this field" with `Option` instead of reflection.
pub struct IncomingStepContext<App> {
    /// The transaction context this message is processed under.
    pub transaction_context: Arc<TransactionContext>,
    /// A handle to the owning application.
    pub app: App,
    /// The as-received transport message.
    pub transport_message: TransportMessage,
    /// Set once the deserialize step has run.
    pub logical_message: Option<LogicalMessage>,
    /// Set once the handler-resolution step has run.
    pub handler_invokers: Option<HandlerInvokers>,
    /// Number of delivery attempts the retry step has observed for this
    /// message so far, including the current one.
    pub delivery_attempt: u32,
}

impl<App> IncomingStepContext<App> {
    /// Start a fresh incoming-pipeline context for a just-received message.
    pub fn new(transport_message: TransportMessage, transaction_context: Arc<TransactionContext>, app: App) -> Self {
        Self {
            transaction_context,
            app,
            transport_message,
            logical_message: None,
            handler_invokers: None,
            delivery_attempt: 0,
        }
    }

    /// Borrow the logical message, if the deserialize step has run.
    ///
    /// # Panics
    /// Panics if called before the deserialize step has attached a logical
    /// message; every step after deserialization may rely on it being
    /// present.
    pub fn logical_message(&self) -> &LogicalMessage {
        self.logical_message
            .as_ref()
            .expect("logical_message accessed before the deserialize step ran")
    }

    /// Mutably borrow the logical message, if the deserialize step has run.
    pub fn logical_message_mut(&mut self) -> &mut LogicalMessage {
        self.logical_message
            .as_mut()
            .expect("logical_message accessed before the deserialize step ran")
    }

    /// Borrow the resolved handler invokers, if the activation step has run.
    pub fn handler_invokers(&self) -> &HandlerInvokers {
        self.handler_invokers
            .as_ref()
            .expect("handler_invokers accessed before the activation step ran")
    }

    /// Mutably borrow the resolved handler invokers.
    pub fn handler_invokers_mut(&mut self) -> &mut HandlerInvokers {
        self.handler_invokers
            .as_mut()
            .expect("handler_invokers accessed before the activation step ran")
    }
}
