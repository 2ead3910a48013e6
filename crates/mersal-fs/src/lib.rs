#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **mersal-fs** – Filesystem-backed implementations of every `mersal-core`
//! storage/transport seam, for durability across process restarts without
//! standing up an external broker or database: [`FileSystemTransport`],
//! [`FileSystemSagaStorage`], [`FileSystemSubscriptionStorage`], and
//! [`FileSystemMessageTracker`].

mod message_tracker;
mod saga_storage;
mod subscription_storage;
mod transport;

pub use message_tracker::FileSystemMessageTracker;
pub use saga_storage::FileSystemSagaStorage;
pub use subscription_storage::FileSystemSubscriptionStorage;
pub use transport::FileSystemTransport;
