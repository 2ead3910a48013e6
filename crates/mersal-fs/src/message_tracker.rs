//! Filesystem message tracker: one empty marker file per processed message
//! id, grounded on the source's `FileSystemMessageTracker`.

use std::path::PathBuf;

use async_trait::async_trait;
use mersal_core::error::{Error, Result};
use mersal_core::idempotency::MessageTracker;
use uuid::Uuid;

fn to_transient(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Transient(anyhow::Error::new(err))
}

/// Tracks processed message ids as empty files under `base_dir`.
pub struct FileSystemMessageTracker {
    base_dir: PathBuf,
}

impl FileSystemMessageTracker {
    /// Build a tracker rooted at `base_dir`, created lazily on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, message_id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{message_id}.tracked"))
    }
}

#[async_trait]
impl MessageTracker for FileSystemMessageTracker {
    async fn is_tracked(&self, message_id: Uuid) -> Result<bool> {
        Ok(self.path_for(message_id).exists())
    }

    async fn track(&self, message_id: Uuid) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await.map_err(to_transient)?;
        tokio::fs::write(self.path_for(message_id), []).await.map_err(to_transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracking_a_message_makes_it_report_as_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileSystemMessageTracker::new(dir.path());
        let id = Uuid::new_v4();
        assert!(!tracker.is_tracked(id).await.unwrap());
        tracker.track(id).await.unwrap();
        assert!(tracker.is_tracked(id).await.unwrap());
    }
}
