//! Outgoing step: stamp the standard headers onto a message about to be
//! sent (spec §4.4, outgoing step 2).

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use mersal_types::{CORRELATION_ID, MESSAGE_ID, MESSAGE_TYPE, SENT_TIME, SOURCE_ADDRESS};
use uuid::Uuid;

use crate::context::CorrelationId;
use crate::pipeline::{Next, OutgoingStepContext, Step};

/// Stamps `message_id`, `sent_time`, `message_type`, `source_address`, and
/// (when one is ambient) `correlation_id` onto an outgoing message.
///
/// The type-to-name map is registered per message type at
/// application-construction time and looked up here by `TypeId` so
/// `message_type` is stamped without the caller having to supply it by
/// hand; `own_address` is this application's own receive address, recorded
/// as `source_address` on everything it sends.
pub struct AttachHeadersStep {
    names: std::collections::HashMap<std::any::TypeId, String>,
    own_address: String,
}

impl AttachHeadersStep {
    /// Build the step from the message-type-to-name map used by the
    /// serializer and this application's own address.
    pub fn new(names: std::collections::HashMap<std::any::TypeId, String>, own_address: impl Into<String>) -> Self {
        Self {
            names,
            own_address: own_address.into(),
        }
    }
}

impl<App: Send + Sync + 'static> Step<App, OutgoingStepContext<App>> for AttachHeadersStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut OutgoingStepContext<App>,
        next: Next<'a, App, OutgoingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let correlation_id = ctx.transaction_context.get_item::<CorrelationId>();
            let headers = ctx.logical_message.headers_mut();
            if !headers.contains_key(MESSAGE_ID) {
                headers.insert(MESSAGE_ID, Uuid::new_v4());
            }
            headers.insert(SENT_TIME, Utc::now().to_rfc3339());
            if let Some(name) = self.names.get(&ctx.logical_message.type_id()) {
                headers.insert(MESSAGE_TYPE, name.clone());
            }
            if !headers.contains_key(SOURCE_ADDRESS) {
                headers.insert(SOURCE_ADDRESS, self.own_address.clone());
            }
            if !headers.contains_key(CORRELATION_ID) {
                if let Some(CorrelationId(id)) = correlation_id {
                    headers.insert(CORRELATION_ID, id);
                }
            }
            next.call(ctx).await
        })
    }
}
