//! Incoming step: load or create the saga instance a message correlates to,
//! and persist it once the message commits (spec §4.6, §9 scenario F).

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::pipeline::{IncomingStepContext, Next, Step};
use crate::saga::{CorrelationErrorHandler, LoadedSaga, SagaData, SagaStorage};

/// How a message type correlates to a saga instance: which saga type it
/// belongs to, which property to match on, how to read that property's
/// value off the message, and whether a miss should start a brand-new
/// instance (an "initiating" message) rather than report a correlation
/// error.
pub struct SagaCorrelationConfig {
    /// The saga type's name, matched against [`SagaData::saga_type`].
    pub saga_type: String,
    /// The correlation property name read off the message.
    pub property_name: String,
    /// Extracts the correlation value from the message.
    pub extract: Arc<dyn Fn(&mersal_types::LogicalMessage) -> Value + Send + Sync>,
    /// Whether a message of this type may start a new saga instance when
    /// no existing one correlates.
    pub initiates: bool,
}

/// Resolves `ctx`'s message against a registered saga correlation, if any,
/// and stashes the result as a [`LoadedSaga`] in the transaction context's
/// items bag for the handler to read and mutate. Registers an `on_commit`
/// hook that inserts, updates, or deletes the saga storage entry based on
/// the final state of that item.
pub struct SagaCorrelationStep {
    storage: Arc<dyn SagaStorage>,
    error_handler: Arc<dyn CorrelationErrorHandler>,
    configs: HashMap<TypeId, SagaCorrelationConfig>,
}

impl SagaCorrelationStep {
    /// Build the step around shared storage, an error handler, and the
    /// message-type-to-correlation-config registry.
    pub fn new(
        storage: Arc<dyn SagaStorage>,
        error_handler: Arc<dyn CorrelationErrorHandler>,
        configs: HashMap<TypeId, SagaCorrelationConfig>,
    ) -> Self {
        Self {
            storage,
            error_handler,
            configs,
        }
    }
}

impl<App: Send + Sync + 'static> Step<App, IncomingStepContext<App>> for SagaCorrelationStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let type_id = ctx.logical_message().type_id();
            let Some(config) = self.configs.get(&type_id) else {
                return next.call(ctx).await;
            };

            let value = (config.extract)(ctx.logical_message());
            let existing = self.storage.find(&config.saga_type, &config.property_name, &value).await?;

            let loaded = match existing {
                Some(data) => Some(LoadedSaga { data, is_new: false }),
                None if config.initiates => {
                    let mut data = SagaData::new(config.saga_type.clone(), Value::Null);
                    data.correlation_properties.push(crate::saga::CorrelationProperty::new(
                        config.property_name.clone(),
                        value,
                    ));
                    Some(LoadedSaga { data, is_new: true })
                }
                None => {
                    let message_type = ctx.logical_message().headers().message_type().unwrap_or_default().to_string();
                    let should_invoke = self.error_handler.handle_correlation_error(&message_type).await?;
                    if !should_invoke {
                        if let Some(invokers) = ctx.handler_invokers.as_mut() {
                            invokers.suppress_all();
                        }
                    }
                    None
                }
            };

            if let Some(loaded) = loaded {
                ctx.transaction_context.insert_item(loaded);
            }

            let transaction_context = ctx.transaction_context.clone();
            let storage = self.storage.clone();
            transaction_context
                .on_commit(crate::context::hook(move |tc| {
                    let storage = storage.clone();
                    async move {
                        let Some(mut loaded) = tc.take_item::<LoadedSaga>() else {
                            return Ok(());
                        };
                        if loaded.data.is_finished {
                            if !loaded.is_new {
                                storage.delete(&mut loaded.data).await?;
                            }
                        } else if loaded.is_new {
                            storage.insert(&loaded.data).await?;
                        } else {
                            storage.update(&mut loaded.data).await?;
                        }
                        Ok(())
                    }
                }))
                .await?;

            next.call(ctx).await
        })
    }
}
