//! Incoming step: call every still-active handler invoker in order,
//! running each one under its own ambient context (spec §4.4 incoming
//! step 5, §9 scenario B).

use std::future::Future;
use std::pin::Pin;

use crate::ambient::with_ambient_context;
use crate::pipeline::{IncomingStepContext, Next, Step};

/// Invokes every resolved, non-suppressed handler in registration order.
/// The first handler error stops invocation of the remaining ones and
/// propagates, which (via the normal pipeline error path) drives the
/// transaction context to roll back and nack.
pub struct InvokeHandlersStep;

impl<App: Send + Sync + 'static> Step<App, IncomingStepContext<App>> for InvokeHandlersStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let transaction_context = ctx.transaction_context.clone();
            let message = ctx.logical_message.take().expect("logical_message must be set before invocation");
            let mut invokers = ctx.handler_invokers.take().unwrap_or_default();

            let result = with_ambient_context(transaction_context, async {
                for invoker in invokers.iter_mut() {
                    invoker.invoke(&message).await?;
                }
                Ok::<_, anyhow::Error>(())
            })
            .await;

            ctx.logical_message = Some(message);
            ctx.handler_invokers = Some(invokers);
            result?;

            next.call(ctx).await
        })
    }
}
