//! Outgoing step: serialize the logical message body to its wire form
//! (spec §4.4, outgoing step). Skipped entirely for a local dispatch,
//! which never touches the wire format.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mersal_types::TransportMessage;

use crate::pipeline::{Dispatch, Next, OutgoingStepContext, Step};
use crate::serializer::JsonSerializer;

/// Serializes `ctx.logical_message` into `ctx.transport_message` using a
/// shared [`JsonSerializer`].
pub struct SerializeBodyStep {
    serializer: Arc<JsonSerializer>,
}

impl SerializeBodyStep {
    /// Build the step around a shared serializer.
    pub fn new(serializer: Arc<JsonSerializer>) -> Self {
        Self { serializer }
    }
}

impl<App: Send + Sync + 'static> Step<App, OutgoingStepContext<App>> for SerializeBodyStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut OutgoingStepContext<App>,
        next: Next<'a, App, OutgoingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !matches!(ctx.dispatch, Dispatch::SendLocal) {
                let body = self.serializer.serialize(&ctx.logical_message)?;
                ctx.transport_message = Some(TransportMessage::new(ctx.logical_message.headers().clone(), body));
            }
            next.call(ctx).await
        })
    }
}
