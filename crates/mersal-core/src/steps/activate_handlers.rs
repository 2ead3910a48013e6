//! Incoming step: resolve the ordered handler invokers for this message
//! (spec §4.3, §4.4 incoming step 2).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::activator::HandlerActivator;
use crate::pipeline::{IncomingStepContext, Next, Step};

/// Resolves `ctx.handler_invokers` from the shared [`HandlerActivator`].
pub struct ActivateHandlersStep<App> {
    activator: Arc<HandlerActivator<App>>,
}

impl<App> ActivateHandlersStep<App> {
    /// Build the step around a shared activator.
    pub fn new(activator: Arc<HandlerActivator<App>>) -> Self {
        Self { activator }
    }
}

impl<App: Clone + Send + Sync + 'static> Step<App, IncomingStepContext<App>> for ActivateHandlersStep<App> {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let invokers = self
                .activator
                .get_handlers(ctx.logical_message(), &ctx.app, &ctx.transaction_context);
            ctx.handler_invokers = Some(invokers);
            next.call(ctx).await
        })
    }
}
