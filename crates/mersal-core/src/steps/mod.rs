//! The standard incoming and outgoing pipeline steps (spec §4.4).

mod activate_handlers;
mod assign_destination_addresses;
mod attach_headers;
mod default_result;
mod deserialize;
mod enqueue_outgoing_message;
mod idempotency_check;
mod invoke_handlers;
mod retry;
mod saga_correlation;
mod serialize_body;

pub use activate_handlers::ActivateHandlersStep;
pub use assign_destination_addresses::AssignDestinationAddressesStep;
pub use attach_headers::AttachHeadersStep;
pub use default_result::DefaultResultStep;
pub use deserialize::DeserializeIncomingMessageStep;
pub use enqueue_outgoing_message::EnqueueOutgoingMessageStep;
pub use idempotency_check::IdempotencyCheckStep;
pub use invoke_handlers::InvokeHandlersStep;
pub use retry::RetryStep;
pub use saga_correlation::{SagaCorrelationConfig, SagaCorrelationStep};
pub use serialize_body::SerializeBodyStep;
