#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **mersal-core** – The transport-agnostic runtime of the `mersal` message
//! bus: transaction contexts, the ambient context, handler activation, the
//! incoming/outgoing pipelines and their standard steps, saga correlation,
//! idempotency, subscription storage, and the worker loop.
//!
//! Nothing in this crate knows how a message actually gets from one process
//! to another, or where a saga/subscription/idempotency record is
//! persisted; those are the [`Transport`], [`saga::SagaStorage`],
//! [`subscription::SubscriptionStorage`], and [`idempotency::MessageTracker`]
//! seams, implemented in `mersal-memory` and `mersal-fs`.
//!
//! The default incoming pipeline order this crate's steps expect to run in
//! is: deserialize, activate handlers, idempotency check, saga correlation,
//! retry (wrapping everything after it), invoke handlers, default result.
//! The outgoing order is: assign destination addresses, attach headers,
//! serialize body, enqueue outgoing message. An application is free to
//! build a [`pipeline::Pipeline`] with a different order or additional
//! steps; nothing here hardcodes it.

pub mod activator;
pub mod ambient;
pub mod context;
pub mod error;
pub mod idempotency;
pub mod pipeline;
pub mod saga;
pub mod serializer;
pub mod steps;
pub mod subscription;
pub mod transport;
pub mod worker;

pub use activator::{Handler, HandlerActivator, HandlerInvoker, HandlerInvokers, MessageContext};
pub use ambient::{current, with_ambient_context};
pub use context::{CorrelationId, TransactionContext};
pub use error::{Error, Result};
pub use idempotency::MessageTracker;
pub use pipeline::{Dispatch, IncomingStepContext, OutgoingMessages, OutgoingStepContext, Pipeline, PipelineInvoker, Step};
pub use saga::{CorrelationErrorHandler, CorrelationProperty, LoadedSaga, SagaData, SagaStorage};
pub use subscription::SubscriptionStorage;
pub use transport::Transport;
pub use worker::{Worker, WorkerConfig, WorkerHandle};
