//! The application facade: wires transport, storage, handler registration,
//! and the pipelines together into [`App`] (spec §4.10).

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use mersal_core::activator::{Handler, HandlerActivator, MessageContext};
use mersal_core::error::Result;
use mersal_core::idempotency::MessageTracker;
use mersal_core::pipeline::{Dispatch, IncomingStepContext, OutgoingStepContext, Pipeline, PipelineInvoker};
use mersal_core::saga::{CorrelationErrorHandler, DefaultCorrelationErrorHandler, SagaStorage};
use mersal_core::serializer::{JsonSerializer, MessageTypeRegistry};
use mersal_core::steps::{
    ActivateHandlersStep, AssignDestinationAddressesStep, AttachHeadersStep, DefaultResultStep,
    DeserializeIncomingMessageStep, EnqueueOutgoingMessageStep, IdempotencyCheckStep, InvokeHandlersStep, RetryStep,
    SagaCorrelationConfig, SagaCorrelationStep, SerializeBodyStep,
};
use mersal_core::subscription::SubscriptionStorage;
use mersal_core::transport::Transport;
use mersal_core::worker::{Worker, WorkerConfig, WorkerHandle};
use mersal_core::{current, with_ambient_context, TransactionContext};
use mersal_fs::{FileSystemMessageTracker, FileSystemSagaStorage, FileSystemSubscriptionStorage, FileSystemTransport};
use mersal_memory::{InMemoryMessageTracker, InMemorySagaStorage, InMemorySubscriptionStorage, InMemoryTransport};
use mersal_types::LogicalMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{AppConfig, StorageConfig};

struct Inner {
    own_address: String,
    transport: Arc<dyn Transport>,
    subscriptions: Arc<dyn SubscriptionStorage>,
    activator: Arc<HandlerActivator<App>>,
    outgoing_pipeline: PipelineInvoker<App, OutgoingStepContext<App>>,
    incoming_pipeline: PipelineInvoker<App, IncomingStepContext<App>>,
    worker_config: WorkerConfig,
    workers: AsyncMutex<Vec<WorkerHandle>>,
}

/// A running `mersal` application: the handle passed to every handler
/// factory, and the entry point for sending, publishing, subscribing, and
/// starting/stopping the worker (spec §4.10).
///
/// Cloning an `App` is cheap; every clone shares the same underlying
/// transport, storage, and registered handlers.
#[derive(Clone)]
pub struct App(Arc<Inner>);

impl App {
    /// Start an [`AppBuilder`] from configuration.
    pub fn builder(config: AppConfig) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// This application's own receive address.
    pub fn own_address(&self) -> &str {
        &self.0.own_address
    }

    /// Send `message` to one explicit destination address.
    pub async fn send(&self, destination: impl Into<String>, message: LogicalMessage) -> Result<()> {
        self.dispatch(Dispatch::Send { destination: destination.into() }, message).await
    }

    /// Publish `message` to every address currently subscribed to `topic`.
    pub async fn publish(&self, topic: impl Into<String>, message: LogicalMessage) -> Result<()> {
        self.dispatch(Dispatch::Publish { topic: topic.into() }, message).await
    }

    /// Dispatch `message` straight to this process's own handlers,
    /// bypassing the transport. Participates in the caller's ambient
    /// transaction if one is active (e.g. called from inside a handler);
    /// otherwise opens and completes a transaction of its own.
    pub async fn send_local(&self, message: LogicalMessage) -> Result<()> {
        if let Some(transaction_context) = current() {
            self.invoke_local(message, transaction_context).await?;
            return Ok(());
        }

        let transaction_context = Arc::new(TransactionContext::new());
        let result = with_ambient_context(transaction_context.clone(), self.invoke_local(message, transaction_context.clone())).await;
        transaction_context.set_result(result.is_ok(), result.is_ok()).await.ok();
        transaction_context.complete().await?;
        transaction_context.close().await;
        result
    }

    async fn invoke_local(&self, message: LogicalMessage, transaction_context: Arc<TransactionContext>) -> Result<()> {
        let mut invokers = self.0.activator.get_handlers(&message, self, &transaction_context);
        for invoker in invokers.iter_mut() {
            invoker.invoke(&message).await.map_err(mersal_core::Error::Other)?;
        }
        Ok(())
    }

    async fn dispatch(&self, dispatch: Dispatch, message: LogicalMessage) -> Result<()> {
        let ambient = current();
        let owns_transaction = ambient.is_none();
        let transaction_context = ambient.unwrap_or_else(|| Arc::new(TransactionContext::new()));
        let mut ctx = OutgoingStepContext::new(message, dispatch, transaction_context.clone(), self.clone());
        self.0
            .outgoing_pipeline
            .invoke(&mut ctx)
            .await
            .map_err(mersal_core::Error::Other)?;

        if owns_transaction {
            transaction_context.set_result(true, true).await.ok();
            transaction_context.complete().await?;
            transaction_context.close().await;
        }
        Ok(())
    }

    /// Register this application as a subscriber of `topic`.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.0.subscriptions.register_subscriber(topic, &self.0.own_address).await
    }

    /// Remove this application's subscription to `topic`.
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.0.subscriptions.unregister_subscriber(topic, &self.0.own_address).await
    }

    /// Start the worker that polls `own_address` and drives received
    /// messages through the incoming pipeline.
    pub async fn start(&self) -> Result<()> {
        self.0.transport.create_queue(&self.0.own_address).await?;
        let worker = Arc::new(Worker::new(
            self.0.worker_config.clone(),
            self.0.transport.clone(),
            self.0.incoming_pipeline.clone(),
            self.clone(),
        ));
        let handle = worker.start();
        self.0.workers.lock().await.push(handle);
        Ok(())
    }

    /// Stop every worker started on this application, waiting for any
    /// in-flight message to finish processing first.
    pub async fn stop(&self) {
        let mut workers = self.0.workers.lock().await;
        for handle in workers.drain(..) {
            handle.stop().await;
        }
    }
}

/// Builds an [`App`] from configuration, handler registrations, and saga
/// correlation rules.
pub struct AppBuilder {
    config: AppConfig,
    registry: MessageTypeRegistry,
    activator: HandlerActivator<App>,
    saga_configs: HashMap<TypeId, SagaCorrelationConfig>,
    correlation_error_handler: Arc<dyn CorrelationErrorHandler>,
}

impl AppBuilder {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: MessageTypeRegistry::new(),
            activator: HandlerActivator::new(),
            saga_configs: HashMap::new(),
            correlation_error_handler: Arc::new(DefaultCorrelationErrorHandler),
        }
    }

    /// Register a message type under `name` together with the factory that
    /// builds a fresh handler for it.
    pub fn handler<T, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(&MessageContext<App>) -> Box<dyn Handler> + Send + Sync + 'static,
    {
        self.registry.register::<T>(name);
        self.activator.register::<T, F>(factory);
        self
    }

    /// Register only a message type, with no handler of its own, so it can
    /// still be serialized (e.g. a message only ever sent, never handled
    /// locally).
    pub fn message_type<T>(mut self, name: impl Into<String>) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.registry.register::<T>(name);
        self
    }

    /// Declare that `Child` extends `Parent` for handler dispatch ordering
    /// (spec §4.3).
    pub fn supertype<Child: 'static, Parent: 'static>(mut self) -> Self {
        self.activator.register_supertype::<Child, Parent>();
        self
    }

    /// Register a saga correlation rule for message type `T`.
    pub fn saga<T>(
        mut self,
        saga_type: impl Into<String>,
        property_name: impl Into<String>,
        extract: impl Fn(&LogicalMessage) -> serde_json::Value + Send + Sync + 'static,
        initiates: bool,
    ) -> Self
    where
        T: 'static,
    {
        self.saga_configs.insert(
            TypeId::of::<T>(),
            SagaCorrelationConfig {
                saga_type: saga_type.into(),
                property_name: property_name.into(),
                extract: Arc::new(extract),
                initiates,
            },
        );
        self
    }

    /// Override the default correlation error handler.
    pub fn correlation_error_handler(mut self, handler: Arc<dyn CorrelationErrorHandler>) -> Self {
        self.correlation_error_handler = handler;
        self
    }

    /// Finish building, wiring up the configured storage backend and
    /// assembling the standard incoming/outgoing pipelines.
    pub fn build(self) -> App {
        let (transport, saga_storage, subscriptions, tracker): (
            Arc<dyn Transport>,
            Arc<dyn SagaStorage>,
            Arc<dyn SubscriptionStorage>,
            Arc<dyn MessageTracker>,
        ) = match &self.config.storage {
            StorageConfig::Memory => (
                Arc::new(InMemoryTransport::new()),
                Arc::new(InMemorySagaStorage::new()),
                Arc::new(InMemorySubscriptionStorage::new()),
                Arc::new(InMemoryMessageTracker::new()),
            ),
            StorageConfig::FileSystem { base_dir } => (
                Arc::new(FileSystemTransport::new(format!("{base_dir}/transport"))),
                Arc::new(FileSystemSagaStorage::new(format!("{base_dir}/sagas"))),
                Arc::new(FileSystemSubscriptionStorage::new(format!("{base_dir}/subscriptions"))),
                Arc::new(FileSystemMessageTracker::new(format!("{base_dir}/tracked"))),
            ),
        };

        let type_names = self.registry.type_names();
        let serializer = Arc::new(JsonSerializer::new(self.registry));
        let activator = Arc::new(self.activator);

        let incoming_pipeline: PipelineInvoker<App, IncomingStepContext<App>> = Pipeline::new()
            .step(DeserializeIncomingMessageStep::new(serializer.clone()))
            .step(ActivateHandlersStep::new(activator.clone()))
            .step(IdempotencyCheckStep::new(tracker.clone()))
            .step(SagaCorrelationStep::new(
                saga_storage.clone(),
                self.correlation_error_handler.clone(),
                self.saga_configs,
            ))
            .step(RetryStep::new(
                self.config.retry_max_attempts,
                self.config.dead_letter_address.clone(),
                transport.clone(),
            ))
            .step(InvokeHandlersStep)
            .step(DefaultResultStep)
            .build();

        let outgoing_pipeline: PipelineInvoker<App, OutgoingStepContext<App>> = Pipeline::new()
            .step(AssignDestinationAddressesStep::new(subscriptions.clone()))
            .step(AttachHeadersStep::new(type_names, self.config.own_address.clone()))
            .step(SerializeBodyStep::new(serializer.clone()))
            .step(EnqueueOutgoingMessageStep::new(transport.clone()))
            .build();

        App(Arc::new(Inner {
            own_address: self.config.own_address.clone(),
            transport,
            subscriptions,
            activator,
            outgoing_pipeline,
            incoming_pipeline,
            worker_config: WorkerConfig {
                address: self.config.own_address,
                max_parallelism: self.config.max_parallelism,
                poll_interval: std::time::Duration::from_millis(self.config.poll_interval_ms),
            },
            workers: AsyncMutex::new(Vec::new()),
        }))
    }
}
