//! Incoming step: turn the raw transport message into a [`LogicalMessage`]
//! (spec §4.4, incoming step 1).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::CorrelationId;
use crate::pipeline::{IncomingStepContext, Next, Step};
use crate::serializer::JsonSerializer;

/// Deserializes `ctx.transport_message` into `ctx.logical_message` using a
/// shared [`JsonSerializer`], stashes the message's correlation id (or, if
/// it carries none, its own `message_id`) in the transaction context for
/// `AttachHeadersStep` to propagate onto any reply, then continues the
/// chain.
pub struct DeserializeIncomingMessageStep {
    serializer: Arc<JsonSerializer>,
}

impl DeserializeIncomingMessageStep {
    /// Build the step around a shared serializer.
    pub fn new(serializer: Arc<JsonSerializer>) -> Self {
        Self { serializer }
    }
}

impl<App: Send + Sync + 'static> Step<App, IncomingStepContext<App>> for DeserializeIncomingMessageStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let headers = ctx.transport_message.headers.clone();
            let body = ctx.transport_message.body.clone();
            let logical = self.serializer.deserialize(headers, body)?;
            let correlation_id = logical.headers().correlation_id().or_else(|| logical.headers().try_message_id());
            ctx.logical_message = Some(logical);
            if let Some(id) = correlation_id {
                ctx.transaction_context.insert_item(CorrelationId(id));
            }
            next.call(ctx).await
        })
    }
}
