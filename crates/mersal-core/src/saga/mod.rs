//! Long-running, stateful message conversations (spec §4.6, §9 scenario F).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// One property a saga correlates incoming messages on: the header/field
/// name to read off the message and the value this particular saga
/// instance is waiting for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationProperty {
    /// The saga data field, or message header, this property reads.
    pub property_name: String,
    /// The value that must match for a message to belong to this saga.
    pub value: Value,
}

impl CorrelationProperty {
    /// Build a correlation property from a name and any serializable value.
    pub fn new(property_name: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            property_name: property_name.into(),
            value: serde_json::to_value(value).expect("correlation property value must serialize"),
        }
    }
}

/// The persisted state of one saga instance.
///
/// `revision` implements optimistic concurrency (spec §4.6): a storage's
/// `update` must reject a write whose `revision` does not match the
/// currently stored one, then bump it on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaData {
    /// The saga instance's unique id.
    pub id: Uuid,
    /// The saga type's name, used to scope correlation-property uniqueness
    /// to sagas of the same type (spec §4.6).
    pub saga_type: String,
    /// Monotonically increasing version, checked on every update.
    pub revision: u64,
    /// The correlation properties this instance currently matches on.
    pub correlation_properties: Vec<CorrelationProperty>,
    /// The domain-specific state payload, opaque to the storage layer.
    pub data: Value,
    /// Whether this saga instance has reached a terminal state and should
    /// be deleted rather than updated further.
    pub is_finished: bool,
}

impl SagaData {
    /// Start a fresh saga instance at revision 0.
    pub fn new(saga_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            saga_type: saga_type.into(),
            revision: 0,
            correlation_properties: Vec::new(),
            data,
            is_finished: false,
        }
    }
}

/// Persists and retrieves [`SagaData`] by id or by correlation property.
///
/// Implementations must enforce that a correlation property value is unique
/// among in-flight sagas **of the same `saga_type`** (spec §4.6): two
/// different saga types may each have an instance correlating on the same
/// `(property_name, value)` pair without conflict, but two instances of the
/// same type may not.
#[async_trait]
pub trait SagaStorage: Send + Sync {
    /// Find a saga instance by its id.
    async fn find_using_id(&self, id: Uuid) -> Result<Option<SagaData>>;

    /// Find a saga instance of `saga_type` whose correlation properties
    /// include `(property_name, value)`.
    async fn find(&self, saga_type: &str, property_name: &str, value: &Value) -> Result<Option<SagaData>>;

    /// Insert a brand-new saga instance.
    ///
    /// # Errors
    /// [`crate::Error::Concurrency`] if any of `saga.correlation_properties`
    /// collides with an existing saga of the same `saga_type`.
    async fn insert(&self, saga: &SagaData) -> Result<()>;

    /// Update an existing saga instance, bumping `saga.revision` in place on
    /// success so the caller's own copy stays in sync with what was stored
    /// (spec §4.6).
    ///
    /// # Errors
    /// [`crate::Error::Concurrency`] if the stored revision does not match
    /// `saga.revision`, or if a changed correlation property collides with
    /// another saga of the same `saga_type`.
    async fn update(&self, saga: &mut SagaData) -> Result<()>;

    /// Delete a saga instance, normally called once `is_finished` is set.
    /// Bumps `saga.revision` regardless of whether a matching row existed
    /// (spec §4.6).
    async fn delete(&self, saga: &mut SagaData) -> Result<()>;
}

/// What the correlation step resolved for the current message: the saga
/// instance itself, plus whether it was freshly created (so the
/// post-invocation persistence hook knows to `insert` rather than
/// `update`). Handlers fetch and mutate this via the ambient transaction
/// context's items bag rather than through a constructor argument, since
/// [`crate::activator::Handler::handle`] only receives the message.
#[derive(Debug, Clone)]
pub struct LoadedSaga {
    /// The saga instance data, possibly freshly created this invocation.
    pub data: SagaData,
    /// Whether `data` was just created and has never been persisted.
    pub is_new: bool,
}

/// Decides what happens when an incoming message's correlation properties
/// match no existing saga and the handler is not an initiator (spec §4.6).
#[async_trait]
pub trait CorrelationErrorHandler: Send + Sync {
    /// Called with the message type that failed to correlate. Returning
    /// `Ok(true)` tells the dispatch step to invoke the handler anyway with
    /// a fresh, uncorrelated saga instance; `Ok(false)` suppresses
    /// invocation for this handler without failing the whole message.
    async fn handle_correlation_error(&self, message_type: &str) -> Result<bool>;
}

/// The default handler: logs and suppresses invocation, matching the
/// pipeline's usual "missing correlation is not a hard failure" behavior.
#[derive(Debug, Default)]
pub struct DefaultCorrelationErrorHandler;

#[async_trait]
impl CorrelationErrorHandler for DefaultCorrelationErrorHandler {
    async fn handle_correlation_error(&self, message_type: &str) -> Result<bool> {
        tracing::debug!(message_type, "no saga correlated for message; suppressing handler invocation");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_handler_suppresses_invocation() {
        let handler = DefaultCorrelationErrorHandler;
        let should_invoke = handler.handle_correlation_error("OrderPlaced").await.unwrap();
        assert!(!should_invoke);
    }

    #[test]
    fn saga_data_starts_at_revision_zero_and_unfinished() {
        let saga = SagaData::new("OrderSaga", serde_json::json!({"step": 1}));
        assert_eq!(saga.revision, 0);
        assert!(!saga.is_finished);
    }
}
