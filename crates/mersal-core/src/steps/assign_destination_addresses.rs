//! Outgoing step: resolve `ctx.destination_addresses` from `ctx.dispatch`
//! (spec §4.4, outgoing step).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::pipeline::{Dispatch, Next, OutgoingStepContext, Step};
use crate::subscription::SubscriptionStorage;

/// Resolves a `Send` dispatch to its one explicit address and a `Publish`
/// dispatch to every address currently subscribed to its topic. A
/// `SendLocal` dispatch resolves to no addresses at all, since it never
/// leaves the process.
pub struct AssignDestinationAddressesStep {
    subscriptions: Arc<dyn SubscriptionStorage>,
}

impl AssignDestinationAddressesStep {
    /// Build the step around shared subscription storage.
    pub fn new(subscriptions: Arc<dyn SubscriptionStorage>) -> Self {
        Self { subscriptions }
    }
}

impl<App: Send + Sync + 'static> Step<App, OutgoingStepContext<App>> for AssignDestinationAddressesStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut OutgoingStepContext<App>,
        next: Next<'a, App, OutgoingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            ctx.destination_addresses = match &ctx.dispatch {
                Dispatch::SendLocal => Vec::new(),
                Dispatch::Send { destination } => vec![destination.clone()],
                Dispatch::Publish { topic } => self.subscriptions.get_subscriber_addresses(topic).await?,
            };
            next.call(ctx).await
        })
    }
}
