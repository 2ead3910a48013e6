//! Incoming step: default to commit-and-ack if no earlier step has already
//! decided the outcome (spec §4.4, last incoming step).

use std::future::Future;
use std::pin::Pin;

use crate::pipeline::{IncomingStepContext, Next, Step};

/// The last step in the default incoming pipeline. Runs the rest of the
/// chain first, then, if nothing set an explicit result, commits and acks.
pub struct DefaultResultStep;

impl<App: Send + Sync + 'static> Step<App, IncomingStepContext<App>> for DefaultResultStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            next.call(ctx).await?;
            ctx.transaction_context.set_result(true, true).await.ok();
            Ok(())
        })
    }
}
