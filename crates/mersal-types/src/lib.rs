#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **mersal-types** – Message, header, and envelope types shared across the
//! `mersal` service bus.
//!
//! This crate carries no async runtime dependency and no I/O: it is the
//! data-model layer that `mersal-core`'s pipeline, activator, and transport
//! traits are defined against, and that every transport/storage
//! implementation serializes to and from.

mod headers;
mod messages;

pub use headers::{
    HeaderValue, MessageHeaders, CORRELATION_ID, DESTINATION_ADDRESS, ERROR_DETAILS,
    IDEMPOTENCY_CHECK, MESSAGE_ID, MESSAGE_TYPE, REPLY_TO, RETURN_ADDRESS, SENT_TIME,
    SOURCE_ADDRESS,
};
pub use messages::{LogicalMessage, OutgoingMessage, TransportBody, TransportMessage};
