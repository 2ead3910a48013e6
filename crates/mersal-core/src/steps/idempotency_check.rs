//! Incoming step: suppress handler invocation for already-processed
//! messages (spec §4.6, §9 scenario A), grounded on the source's
//! `idempotency_checker_step`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mersal_types::IDEMPOTENCY_CHECK;

use crate::idempotency::MessageTracker;
use crate::pipeline::{IncomingStepContext, Next, Step};

/// Checks whether the current message's id has already been tracked as
/// processed. If so, marks every resolved handler invoker as
/// non-invoking and stamps the `idempotency-check` header so later steps
/// (logging, metrics) can see that this delivery was a duplicate; the
/// actual durable `track()` call happens from an `on_commit` hook so a
/// rolled-back delivery is never marked as seen.
pub struct IdempotencyCheckStep {
    tracker: Arc<dyn MessageTracker>,
    /// Whether a duplicate message should also stop later incoming steps
    /// (saga persistence, etc.) from running at all, versus just
    /// suppressing handler invocation. The source supports both policies
    /// via a constructor flag; `strict` maps to "stop the pipeline".
    strict: bool,
}

impl IdempotencyCheckStep {
    /// Build the step against a shared tracker, using the non-strict
    /// policy: duplicates suppress handlers but still run the rest of the
    /// pipeline.
    pub fn new(tracker: Arc<dyn MessageTracker>) -> Self {
        Self { tracker, strict: false }
    }

    /// Build the step with the strict policy: a duplicate short-circuits
    /// the incoming pipeline immediately after this step.
    pub fn strict(tracker: Arc<dyn MessageTracker>) -> Self {
        Self { tracker, strict: true }
    }
}

impl<App: Send + Sync + 'static> Step<App, IncomingStepContext<App>> for IdempotencyCheckStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let message_id = ctx.logical_message().headers().message_id();
            let already_tracked = self.tracker.is_tracked(message_id).await?;

            if already_tracked {
                tracing::debug!(%message_id, "duplicate delivery detected; suppressing handler invocation");
                ctx.logical_message_mut().headers_mut().insert(IDEMPOTENCY_CHECK, true);
                if let Some(invokers) = ctx.handler_invokers.as_mut() {
                    invokers.suppress_all();
                }
                if self.strict {
                    return Ok(());
                }
            } else {
                let tracker = self.tracker.clone();
                ctx.transaction_context
                    .on_commit(crate::context::hook(move |_| {
                        let tracker = tracker.clone();
                        async move { tracker.track(message_id).await.map_err(anyhow::Error::from) }
                    }))
                    .await?;
            }

            next.call(ctx).await
        })
    }
}
