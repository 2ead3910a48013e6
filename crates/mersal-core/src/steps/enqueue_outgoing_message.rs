//! Outgoing step: append the addressed message to the transaction's
//! outgoing batch and ensure it is flushed through the transport on commit
//! (spec §4.6, "items[\"outgoing-messages\"]").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mersal_types::OutgoingMessage;

use crate::pipeline::{Next, OutgoingMessages, OutgoingStepContext, Step};
use crate::transport::Transport;

/// Appends one [`OutgoingMessage`] per resolved destination address to the
/// transaction's [`OutgoingMessages`] batch. Registers an `on_commit` hook
/// that drains and sends the whole batch; since every enqueue call within
/// one transaction registers its own hook but only the first one to run
/// finds anything left to drain, the batch is flushed exactly once per
/// transaction regardless of how many messages were sent during it.
pub struct EnqueueOutgoingMessageStep {
    transport: Arc<dyn Transport>,
}

impl EnqueueOutgoingMessageStep {
    /// Build the step around the shared transport the commit hook sends
    /// through.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl<App: Send + Sync + 'static> Step<App, OutgoingStepContext<App>> for EnqueueOutgoingMessageStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut OutgoingStepContext<App>,
        next: Next<'a, App, OutgoingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(transport_message) = &ctx.transport_message {
                let mut batch = ctx.transaction_context.get_item::<OutgoingMessages>().unwrap_or_default();
                for address in &ctx.destination_addresses {
                    batch.0.push(OutgoingMessage::new(address.clone(), transport_message.clone()));
                }
                ctx.transaction_context.insert_item(batch);

                let transport = self.transport.clone();
                ctx.transaction_context
                    .on_commit(crate::context::hook(move |tc| {
                        let transport = transport.clone();
                        async move {
                            let Some(batch) = tc.take_item::<OutgoingMessages>() else {
                                return Ok(());
                            };
                            if batch.0.is_empty() {
                                return Ok(());
                            }
                            transport.send_outgoing_messages(batch.0).await.map_err(anyhow::Error::from)
                        }
                    }))
                    .await?;
            }

            next.call(ctx).await
        })
    }
}
