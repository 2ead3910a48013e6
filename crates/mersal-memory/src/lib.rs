#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **mersal-memory** – In-process reference implementations of every
//! `mersal-core` storage/transport seam: [`InMemoryTransport`],
//! [`InMemorySagaStorage`], [`InMemorySubscriptionStorage`], and
//! [`InMemoryMessageTracker`]. Nothing here survives a process restart;
//! durable backends live in `mersal-fs`.

mod message_tracker;
mod saga_storage;
mod subscription_storage;
mod transport;

pub use message_tracker::InMemoryMessageTracker;
pub use saga_storage::InMemorySagaStorage;
pub use subscription_storage::InMemorySubscriptionStorage;
pub use transport::InMemoryTransport;
