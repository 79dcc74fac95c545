//! Checkpoint storage manager
//!
//! Wraps any [`StorageBackend`] with scoped store/restore semantics: a
//! staged write becomes visible to `restore` only after an explicit commit,
//! and abandoned staging space is reclaimed on drop. [`validate`] is the
//! round-trip acceptance test every backend must pass before being trusted
//! operationally.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use sync_core::{Error, Result, StorageConfig};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{build_backend, StorageBackend};

/// Checkpoint-oriented facade over a storage backend
pub struct StorageManager {
    backend: Arc<dyn StorageBackend>,
    staging_root: PathBuf,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("staging_root", &self.staging_root)
            .finish_non_exhaustive()
    }
}

impl StorageManager {
    /// Build a manager from a raw configuration mapping
    ///
    /// Fails with a configuration error on an unknown discriminator or
    /// missing required fields, before any network call.
    pub async fn build(value: &Value) -> Result<Self> {
        let config = StorageConfig::from_value(value)?;
        let backend = build_backend(&config).await?;
        info!(kind = config.kind(), "Built storage manager");
        Ok(Self::with_backend(backend))
    }

    /// Wrap an already-constructed backend
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            staging_root: std::env::temp_dir().join("viewsync-staging"),
        }
    }

    /// Override the staging directory used for scoped acquisitions
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    /// Reserve a fresh storage id and a writable staging path
    ///
    /// The returned guard uploads on [`StoreGuard::commit`]; dropping it
    /// without committing discards the staging directory and leaves nothing
    /// visible to `restore`.
    #[instrument(skip(self))]
    pub async fn store_path(&self) -> Result<StoreGuard> {
        let storage_id = Uuid::new_v4().to_string();
        let dir = self.staging_root.join(&storage_id);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(%storage_id, ?dir, "Reserved staging path");

        Ok(StoreGuard {
            storage_id,
            dir,
            backend: self.backend.clone(),
            committed: false,
        })
    }

    /// Retrieve a stored artifact into a scoped local path
    #[instrument(skip(self))]
    pub async fn restore_path(&self, storage_id: &str) -> Result<RestoreGuard> {
        let dir = self
            .staging_root
            .join(format!("restore-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;

        match self.backend.restore(storage_id, &dir).await {
            Ok(()) => Ok(RestoreGuard { dir }),
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                Err(e)
            }
        }
    }

    /// Remove a stored artifact; removing an unknown id succeeds
    #[instrument(skip(self))]
    pub async fn delete(&self, storage_id: &str) -> Result<()> {
        self.backend.delete(storage_id).await
    }
}

/// Scoped staging directory for a checkpoint write
pub struct StoreGuard {
    storage_id: String,
    dir: PathBuf,
    backend: Arc<dyn StorageBackend>,
    committed: bool,
}

impl StoreGuard {
    /// The reserved storage id
    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    /// The writable staging path
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Upload the staged directory and release the staging space
    ///
    /// If the upload fails partway, anything already written under the id is
    /// removed so a later `restore` cannot observe a half-written artifact.
    pub async fn commit(mut self) -> Result<String> {
        if let Err(e) = self.backend.store(&self.storage_id, &self.dir).await {
            let _ = self.backend.delete(&self.storage_id).await;
            return Err(e);
        }

        self.committed = true;
        let _ = tokio::fs::remove_dir_all(&self.dir).await;
        debug!(storage_id = %self.storage_id, "Committed checkpoint");
        Ok(self.storage_id.clone())
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

/// Scoped local copy of a restored checkpoint
#[derive(Debug)]
pub struct RestoreGuard {
    dir: PathBuf,
}

impl RestoreGuard {
    /// The restored directory
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Deref for RestoreGuard {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.dir
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

const VALIDATION_FILE: &str = "VALIDATE.txt";

/// Round-trip self-test for a fully-built manager
///
/// Stores a random token, restores it, checks byte equality, deletes it,
/// and confirms the deleted id is no longer restorable. Every failure mode
/// surfaces as a validation error.
pub async fn validate(manager: &StorageManager) -> Result<()> {
    run_validation(manager).await.map_err(|e| match e {
        Error::Validation { .. } => e,
        other => Error::Validation {
            message: other.to_string(),
        },
    })
}

async fn run_validation(manager: &StorageManager) -> Result<()> {
    let token = Uuid::new_v4().to_string();

    let guard = manager.store_path().await?;
    tokio::fs::write(guard.path().join(VALIDATION_FILE), token.as_bytes()).await?;
    let storage_id = guard.commit().await?;

    {
        let restored = manager.restore_path(&storage_id).await?;
        let data = tokio::fs::read(restored.path().join(VALIDATION_FILE)).await?;
        if data != token.as_bytes() {
            return Err(Error::Validation {
                message: "restored token does not match stored token".to_string(),
            });
        }
    }

    manager.delete(&storage_id).await?;

    if manager.restore_path(&storage_id).await.is_ok() {
        return Err(Error::Validation {
            message: "artifact still restorable after delete".to_string(),
        });
    }

    info!("Storage validation passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use tempfile::TempDir;

    fn manager_with_memory() -> (TempDir, Arc<MemoryBackend>, StorageManager) {
        let staging = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let manager = StorageManager::with_backend(backend.clone())
            .with_staging_root(staging.path().to_path_buf());
        (staging, backend, manager)
    }

    #[tokio::test]
    async fn test_store_restore_roundtrip() {
        let (_staging, _backend, manager) = manager_with_memory();

        let guard = manager.store_path().await.unwrap();
        tokio::fs::write(guard.path().join("weights.bin"), b"abc")
            .await
            .unwrap();
        let storage_id = guard.commit().await.unwrap();

        let restored = manager.restore_path(&storage_id).await.unwrap();
        let data = tokio::fs::read(restored.path().join("weights.bin"))
            .await
            .unwrap();
        assert_eq!(data, b"abc");
    }

    #[tokio::test]
    async fn test_uncommitted_guard_uploads_nothing() {
        let (_staging, backend, manager) = manager_with_memory();

        let guard = manager.store_path().await.unwrap();
        tokio::fs::write(guard.path().join("weights.bin"), b"abc")
            .await
            .unwrap();
        let storage_id = guard.storage_id().to_string();
        let staging_dir = guard.path().to_path_buf();
        drop(guard);

        assert!(backend.object_names().is_empty());
        assert!(!staging_dir.exists());
        assert!(manager.restore_path(&storage_id).await.is_err());
    }

    #[tokio::test]
    async fn test_restore_unknown_id_fails() {
        let (_staging, _backend, manager) = manager_with_memory();
        let err = manager.restore_path("missing").await.unwrap_err();
        assert!(matches!(err, Error::StorageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_staging, _backend, manager) = manager_with_memory();
        manager.delete("never-existed").await.unwrap();
        manager.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_passes_on_memory_backend() {
        let (_staging, _backend, manager) = manager_with_memory();
        validate(&manager).await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_surfaces_corruption() {
        let (_staging, backend, manager) = manager_with_memory();
        backend.set_corrupt_restores(true);

        let err = validate(&manager).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_guards_do_not_interfere() {
        let (_staging, _backend, manager) = manager_with_memory();

        let first = manager.store_path().await.unwrap();
        let second = manager.store_path().await.unwrap();
        assert_ne!(first.storage_id(), second.storage_id());

        tokio::fs::write(first.path().join("a.bin"), b"1").await.unwrap();
        tokio::fs::write(second.path().join("b.bin"), b"2").await.unwrap();

        let first_id = first.commit().await.unwrap();
        let second_id = second.commit().await.unwrap();

        let restored = manager.restore_path(&first_id).await.unwrap();
        assert!(restored.path().join("a.bin").exists());
        assert!(!restored.path().join("b.bin").exists());
        drop(restored);

        manager.delete(&first_id).await.unwrap();
        assert!(manager.restore_path(&second_id).await.is_ok());
    }
}
