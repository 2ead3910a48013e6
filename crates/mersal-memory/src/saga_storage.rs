//! An in-process saga storage keyed by saga id, with an index over
//! correlation properties for `find`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mersal_core::error::{Error, Result};
use mersal_core::saga::{SagaData, SagaStorage};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Saga storage backed by an in-memory map from id to [`SagaData`].
///
/// Correlation-property uniqueness is enforced within a saga's own
/// `saga_type` (spec §4.6): two different saga types may each have an
/// instance correlating on the same `(property_name, value)` pair without
/// conflict.
#[derive(Clone, Default)]
pub struct InMemorySagaStorage {
    sagas: Arc<RwLock<HashMap<Uuid, SagaData>>>,
}

impl InMemorySagaStorage {
    /// Build empty saga storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn find_conflicting_locked(sagas: &HashMap<Uuid, SagaData>, saga: &SagaData) -> Option<Uuid> {
        for other in sagas.values() {
            if other.id == saga.id || other.saga_type != saga.saga_type {
                continue;
            }
            for prop in &saga.correlation_properties {
                if other
                    .correlation_properties
                    .iter()
                    .any(|p| p.property_name == prop.property_name && p.value == prop.value)
                {
                    return Some(other.id);
                }
            }
        }
        None
    }
}

#[async_trait]
impl SagaStorage for InMemorySagaStorage {
    async fn find_using_id(&self, id: Uuid) -> Result<Option<SagaData>> {
        Ok(self.sagas.read().await.get(&id).cloned())
    }

    async fn find(&self, saga_type: &str, property_name: &str, value: &Value) -> Result<Option<SagaData>> {
        let sagas = self.sagas.read().await;
        Ok(sagas
            .values()
            .find(|saga| {
                saga.saga_type == saga_type
                    && saga
                        .correlation_properties
                        .iter()
                        .any(|p| p.property_name == property_name && &p.value == value)
            })
            .cloned())
    }

    async fn insert(&self, saga: &SagaData) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        if let Some(conflict) = Self::find_conflicting_locked(&sagas, saga) {
            return Err(Error::Concurrency {
                saga_id: conflict,
                detail: "correlation property already claimed by another saga of the same type".to_string(),
            });
        }
        sagas.insert(saga.id, saga.clone());
        Ok(())
    }

    async fn update(&self, saga: &mut SagaData) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        let stored_revision = sagas.get(&saga.id).map(|s| s.revision);
        match stored_revision {
            Some(revision) if revision == saga.revision => {}
            Some(_) => {
                return Err(Error::Concurrency {
                    saga_id: saga.id,
                    detail: "stored revision does not match the caller's revision".to_string(),
                });
            }
            None => {
                return Err(Error::Concurrency {
                    saga_id: saga.id,
                    detail: "no such saga to update".to_string(),
                });
            }
        }
        if let Some(conflict) = Self::find_conflicting_locked(&sagas, saga) {
            return Err(Error::Concurrency {
                saga_id: conflict,
                detail: "correlation property already claimed by another saga of the same type".to_string(),
            });
        }
        let mut next = saga.clone();
        next.revision += 1;
        sagas.insert(saga.id, next);
        saga.revision += 1;
        Ok(())
    }

    async fn delete(&self, saga: &mut SagaData) -> Result<()> {
        self.sagas.write().await.remove(&saga.id);
        saga.revision += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mersal_core::saga::CorrelationProperty;

    fn saga_with(saga_type: &str, property: &str, value: Value) -> SagaData {
        let mut saga = SagaData::new(saga_type, Value::Null);
        saga.correlation_properties.push(CorrelationProperty::new(property, value));
        saga
    }

    #[tokio::test]
    async fn update_rejects_stale_revision() {
        let storage = InMemorySagaStorage::new();
        let saga = saga_with("Order", "order_id", Value::String("o-1".into()));
        storage.insert(&saga).await.unwrap();

        let mut stale = saga.clone();
        stale.data = serde_json::json!({"changed": true});
        let mut stale_writer = stale.clone();
        storage.update(&mut stale).await.unwrap();
        assert_eq!(stale.revision, 1);

        let result = storage.update(&mut stale_writer).await;
        assert!(matches!(result, Err(Error::Concurrency { .. })));
    }

    #[tokio::test]
    async fn same_correlation_value_is_fine_across_different_saga_types() {
        let storage = InMemorySagaStorage::new();
        let a = saga_with("OrderSaga", "id", Value::String("x".into()));
        let b = saga_with("ShipmentSaga", "id", Value::String("x".into()));
        storage.insert(&a).await.unwrap();
        storage.insert(&b).await.unwrap();
    }

    #[tokio::test]
    async fn same_correlation_value_conflicts_within_the_same_saga_type() {
        let storage = InMemorySagaStorage::new();
        let a = saga_with("OrderSaga", "id", Value::String("x".into()));
        let b = saga_with("OrderSaga", "id", Value::String("x".into()));
        storage.insert(&a).await.unwrap();
        let result = storage.insert(&b).await;
        assert!(matches!(result, Err(Error::Concurrency { .. })));
    }
}
