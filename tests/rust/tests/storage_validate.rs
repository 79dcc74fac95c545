//! Storage manager acceptance tests
//!
//! Runs the round-trip validation gate against a real filesystem-backed
//! manager built from configuration, the way an operator would exercise a
//! newly configured backend.

use serde_json::json;
use storage::{validate, StorageManager};
use sync_core::Error;
use tempfile::TempDir;

async fn shared_fs_manager(remote: &TempDir, staging: &TempDir) -> StorageManager {
    StorageManager::build(&json!({
        "type": "shared-fs",
        "storage_path": remote.path(),
    }))
    .await
    .unwrap()
    .with_staging_root(staging.path().to_path_buf())
}

#[tokio::test]
async fn validate_passes_on_shared_fs() {
    let remote = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let manager = shared_fs_manager(&remote, &staging).await;

    validate(&manager).await.unwrap();

    // The self-test cleans up after itself.
    assert_eq!(std::fs::read_dir(remote.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn store_restore_delete_lifecycle() {
    let remote = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let manager = shared_fs_manager(&remote, &staging).await;

    let guard = manager.store_path().await.unwrap();
    std::fs::create_dir_all(guard.path().join("model")).unwrap();
    std::fs::write(guard.path().join("model/weights.bin"), b"weights").unwrap();
    std::fs::write(guard.path().join("metadata.json"), b"{}").unwrap();
    let storage_id = guard.commit().await.unwrap();

    {
        let restored = manager.restore_path(&storage_id).await.unwrap();
        assert_eq!(
            std::fs::read(restored.path().join("model/weights.bin")).unwrap(),
            b"weights"
        );
        assert_eq!(
            std::fs::read(restored.path().join("metadata.json")).unwrap(),
            b"{}"
        );
    }

    manager.delete(&storage_id).await.unwrap();
    let err = manager.restore_path(&storage_id).await.unwrap_err();
    assert!(matches!(err, Error::StorageNotFound { .. }));

    // A second delete of the same id is still fine.
    manager.delete(&storage_id).await.unwrap();
}

#[tokio::test]
async fn abandoned_store_is_invisible() {
    let remote = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let manager = shared_fs_manager(&remote, &staging).await;

    let storage_id = {
        let guard = manager.store_path().await.unwrap();
        std::fs::write(guard.path().join("partial.bin"), b"half-written").unwrap();
        guard.storage_id().to_string()
        // Guard dropped without commit.
    };

    assert!(manager.restore_path(&storage_id).await.is_err());
    assert_eq!(std::fs::read_dir(remote.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn build_rejects_unknown_backend() {
    let err = StorageManager::build(&json!({"type": "nfs2000", "bucket": "b"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn build_rejects_blob_container_without_auth() {
    let err = StorageManager::build(&json!({
        "type": "blob-container",
        "container": "logs",
    }))
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}
