//! Error taxonomy for the message-processing runtime (spec §7).

use uuid::Uuid;

/// Errors produced by `mersal-core`'s runtime components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hook was registered, or `set_result` called, on a transaction
    /// context that had already completed or closed.
    #[error("invalid transaction context state: {0}")]
    InvalidState(&'static str),

    /// A saga storage `update` found a stored revision different from the
    /// caller's, or an `insert`/`update` collided with an existing
    /// correlation property.
    #[error("concurrency conflict on saga {saga_id}: {detail}")]
    Concurrency {
        /// The saga whose revision or correlation properties conflicted.
        saga_id: Uuid,
        /// A human-readable description of the conflict.
        detail: String,
    },

    /// No saga matched a handler's correlation properties and the handler
    /// is not an initiator.
    #[error("no saga correlated for message type {message_type}")]
    Correlation {
        /// The message type whose correlation properties found no match.
        message_type: String,
    },

    /// A transport or storage signalled that the operation should be
    /// retried (e.g. a transient I/O failure).
    #[error("transient failure: {0}")]
    Transient(#[source] anyhow::Error),

    /// A message exhausted its retry budget; carries the original
    /// transport message's id so the retry step can report it.
    #[error("message {message_id} exhausted retries: {source}")]
    Poison {
        /// The id of the message that could not be processed.
        message_id: Uuid,
        /// The underlying handler/pipeline failure.
        #[source]
        source: anyhow::Error,
    },

    /// A required collaborator (serializer, storage, transport) was not
    /// configured for an operation that needs it.
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    /// A handler, step, or hook raised an error that does not fit one of
    /// the above categories.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias for `Result<T, mersal_core::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
