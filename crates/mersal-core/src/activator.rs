//! Handler registration and dispatch-order resolution (spec §4.3).
//!
//! Rust has no runtime class hierarchy to walk, so the "parent type"
//! relationship the source discovers via `type(message).__mro__` is instead
//! an explicit relation the application registers up front with
//! [`HandlerActivator::register_supertype`].

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mersal_types::{LogicalMessage, MessageHeaders};

use crate::context::TransactionContext;

/// User code that reacts to a message. A fresh handler is built by its
/// factory for every invocation (spec §3, "Ownership").
#[async_trait]
pub trait Handler: Send {
    /// React to `message`. An error aborts the remaining handler invokers
    /// for this message (spec §4.4 step 5) and propagates to the pipeline.
    async fn handle(&mut self, message: &LogicalMessage) -> anyhow::Result<()>;
}

/// What a handler factory is given to build a fresh handler: the message's
/// headers, the transaction context it is running under, and the
/// application handle (parameterized so `mersal-core` stays independent of
/// the `App` façade type).
pub struct MessageContext<App> {
    /// The transaction context the handler is running under.
    pub transaction_context: Arc<TransactionContext>,
    /// The headers of the message about to be dispatched.
    pub headers: MessageHeaders,
    /// A handle to the owning application (e.g. to call `send_local`).
    pub app: App,
}

/// Builds a fresh [`Handler`] for one invocation.
pub type HandlerFactory<App> = Arc<dyn Fn(&MessageContext<App>) -> Box<dyn Handler> + Send + Sync>;

/// Pairs a handler with the transaction context it runs under and a mutable
/// `should_invoke` flag the pipeline can clear (idempotency, failed
/// correlation) without removing the invoker from the chain.
pub struct HandlerInvoker {
    handler: Box<dyn Handler>,
    transaction_context: Arc<TransactionContext>,
    /// Whether the pipeline should still call this invoker's handler.
    /// A step may flip this to `false` to skip invocation while leaving
    /// downstream steps (saga persistence, result defaulting) unaffected.
    pub should_invoke: bool,
}

impl HandlerInvoker {
    /// Wrap a freshly built handler together with its transaction context.
    pub fn new(handler: Box<dyn Handler>, transaction_context: Arc<TransactionContext>) -> Self {
        Self {
            handler,
            transaction_context,
            should_invoke: true,
        }
    }

    /// The transaction context this invoker is bound to.
    pub fn transaction_context(&self) -> &Arc<TransactionContext> {
        &self.transaction_context
    }

    /// Call the wrapped handler if `should_invoke` is still true; otherwise
    /// a no-op success.
    pub async fn invoke(&mut self, message: &LogicalMessage) -> anyhow::Result<()> {
        if !self.should_invoke {
            return Ok(());
        }
        self.handler.handle(message).await
    }
}

/// An ordered sequence of [`HandlerInvoker`]s, in the order
/// [`HandlerActivator::get_handlers`] resolved them.
#[derive(Default)]
pub struct HandlerInvokers(
    /// The resolved invokers, in dispatch order.
    pub Vec<HandlerInvoker>,
);

impl HandlerInvokers {
    /// Iterate the invokers in order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, HandlerInvoker> {
        self.0.iter_mut()
    }

    /// How many invokers were resolved for this message.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no handler was registered for this message's type chain.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mark every invoker as non-invoking, e.g. on a duplicate message.
    pub fn suppress_all(&mut self) {
        for invoker in &mut self.0 {
            invoker.should_invoke = false;
        }
    }
}

/// Registry mapping a message type to the ordered factories that build its
/// handlers, plus the explicit supertype relation used to resolve
/// base-type handlers for derived messages.
pub struct HandlerActivator<App> {
    factories: HashMap<TypeId, Vec<HandlerFactory<App>>>,
    supertype: HashMap<TypeId, TypeId>,
}

impl<App> Default for HandlerActivator<App> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
            supertype: HashMap::new(),
        }
    }
}

impl<App: Clone + Send + Sync + 'static> HandlerActivator<App> {
    /// Create an empty activator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for message type `T`. Multiple factories may be
    /// registered for the same type; they are tried in registration order.
    pub fn register<T, F>(&mut self, factory: F)
    where
        T: 'static,
        F: Fn(&MessageContext<App>) -> Box<dyn Handler> + Send + Sync + 'static,
    {
        self.factories.entry(TypeId::of::<T>()).or_default().push(Arc::new(factory));
    }

    /// Declare that `Child` extends `Parent`: a handler registered for
    /// `Parent` is invoked (after `Child`'s own handlers) whenever a
    /// `Child` message is dispatched.
    pub fn register_supertype<Child: 'static, Parent: 'static>(&mut self) {
        self.supertype.insert(TypeId::of::<Child>(), TypeId::of::<Parent>());
    }

    /// The type-id chain for `type_id`, most-derived first, following
    /// registered supertype links until none remain.
    pub fn type_chain(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut chain = vec![type_id];
        let mut current = type_id;
        while let Some(&parent) = self.supertype.get(&current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Resolve the ordered [`HandlerInvokers`] for `message`: child-type
    /// handlers before parent-type handlers, registration order within a
    /// type (spec §4.3).
    pub fn get_handlers(
        &self,
        message: &LogicalMessage,
        app: &App,
        transaction_context: &Arc<TransactionContext>,
    ) -> HandlerInvokers {
        let mut invokers = Vec::new();
        for type_id in self.type_chain(message.type_id()) {
            if let Some(factories) = self.factories.get(&type_id) {
                for factory in factories {
                    let message_context = MessageContext {
                        transaction_context: transaction_context.clone(),
                        headers: message.headers().clone(),
                        app: app.clone(),
                    };
                    let handler = factory(&message_context);
                    invokers.push(HandlerInvoker::new(handler, transaction_context.clone()));
                }
            }
        }
        HandlerInvokers(invokers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mersal_types::MessageHeaders;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    struct Base;
    struct Child;

    struct RecordingHandler {
        label: &'static str,
        calls: StdArc<SyncMutexVec>,
    }

    struct SyncMutexVec(std::sync::Mutex<Vec<&'static str>>);

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn handle(&mut self, _message: &LogicalMessage) -> anyhow::Result<()> {
            self.calls.0.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    #[tokio::test]
    async fn parent_type_handlers_run_after_child_type_handlers_in_registration_order() {
        let calls = StdArc::new(SyncMutexVec(std::sync::Mutex::new(Vec::new())));
        let mut activator: HandlerActivator<()> = HandlerActivator::new();
        activator.register_supertype::<Child, Base>();

        {
            let calls = calls.clone();
            activator.register::<Child, _>(move |_ctx| {
                Box::new(RecordingHandler { label: "h1", calls: calls.clone() }) as Box<dyn Handler>
            });
        }
        {
            let calls = calls.clone();
            activator.register::<Child, _>(move |_ctx| {
                Box::new(RecordingHandler { label: "h2", calls: calls.clone() }) as Box<dyn Handler>
            });
        }
        {
            let calls = calls.clone();
            activator.register::<Base, _>(move |_ctx| {
                Box::new(RecordingHandler { label: "h3", calls: calls.clone() }) as Box<dyn Handler>
            });
        }

        let message = LogicalMessage::new(MessageHeaders::new(), Child);
        let ctx = StdArc::new(TransactionContext::new());
        let mut invokers = activator.get_handlers(&message, &(), &ctx);

        assert_eq!(invokers.len(), 3);
        for invoker in invokers.iter_mut() {
            invoker.invoke(&message).await.unwrap();
        }

        assert_eq!(*calls.0.lock().unwrap(), vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn suppressed_invokers_are_skipped() {
        let calls = StdArc::new(SyncMutexVec(std::sync::Mutex::new(Vec::new())));
        let mut activator: HandlerActivator<()> = HandlerActivator::new();
        {
            let calls = calls.clone();
            activator.register::<Base, _>(move |_ctx| {
                Box::new(RecordingHandler { label: "h1", calls: calls.clone() }) as Box<dyn Handler>
            });
        }

        let message = LogicalMessage::new(MessageHeaders::new(), Base);
        let ctx = StdArc::new(TransactionContext::new());
        let mut invokers = activator.get_handlers(&message, &(), &ctx);
        invokers.suppress_all();
        for invoker in invokers.iter_mut() {
            invoker.invoke(&message).await.unwrap();
        }

        assert!(calls.0.lock().unwrap().is_empty());
    }
}
