//! End-to-end mirror scenarios
//!
//! Exercises the fetcher against scripted and filesystem-backed remotes:
//! initial sync, idempotent cycles, modification-driven re-downloads, and
//! construction from raw configuration mappings.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use fetcher::Fetcher;
use serde_json::json;
use storage::MemoryBackend;
use sync_core::Error;
use tempfile::TempDir;

#[tokio::test]
async fn mirror_cycle_downloads_then_settles_then_follows_updates() {
    let backend = Arc::new(MemoryBackend::new("b"));
    let t1 = Utc.timestamp_opt(1_000, 0).unwrap();
    let t2 = Utc.timestamp_opt(2_000, 0).unwrap();
    backend.put_object("run/events.1", "first", t1);

    let root = TempDir::new().unwrap();
    let mut fetcher = Fetcher::with_backend(
        backend.clone(),
        vec!["run/".to_string()],
        root.path().to_path_buf(),
    );

    // First cycle mirrors the object into {root}/{bucket}/{key}.
    let report = fetcher.fetch_new().await.unwrap();
    assert_eq!(report.downloaded, 1);
    let mirrored = root.path().join("b/run/events.1");
    assert_eq!(std::fs::read(&mirrored).unwrap(), b"first");

    // Identical listing: nothing to do.
    let report = fetcher.fetch_new().await.unwrap();
    assert_eq!(report.downloaded, 0);

    // Strictly newer timestamp: downloaded again.
    backend.put_object("run/events.1", "second", t2);
    let report = fetcher.fetch_new().await.unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(std::fs::read(&mirrored).unwrap(), b"second");
}

#[tokio::test]
async fn fetcher_builds_from_shared_fs_config() {
    let remote = TempDir::new().unwrap();
    std::fs::create_dir_all(remote.path().join("run-1")).unwrap();
    std::fs::write(remote.path().join("run-1/events.1"), b"payload").unwrap();

    let root = TempDir::new().unwrap();
    let config = json!({
        "type": "shared-fs",
        "storage_path": remote.path(),
    });

    let mut fetcher = Fetcher::build(
        &config,
        vec!["run-1/".to_string()],
        root.path().to_path_buf(),
    )
    .await
    .unwrap();

    let report = fetcher.fetch_new().await.unwrap();
    assert_eq!(report.downloaded, 1);

    let identity = remote.path().file_name().unwrap();
    let mirrored = root.path().join(identity).join("run-1/events.1");
    assert_eq!(std::fs::read(mirrored).unwrap(), b"payload");
}

#[tokio::test]
async fn fetcher_build_rejects_unknown_type_before_any_network() {
    let root = TempDir::new().unwrap();
    let err = Fetcher::build(
        &json!({"type": "nfs2000"}),
        vec!["run/".to_string()],
        root.path().to_path_buf(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn mirror_survives_a_flaky_download() {
    let backend = Arc::new(MemoryBackend::new("b"));
    let t1 = Utc.timestamp_opt(1_000, 0).unwrap();
    backend.put_object("run/events.1", "data", t1);
    backend.fail_next_download("run/events.1");

    let root = TempDir::new().unwrap();
    let mut fetcher = Fetcher::with_backend(
        backend,
        vec!["run/".to_string()],
        root.path().to_path_buf(),
    );

    assert!(fetcher.fetch_new().await.is_err());

    let report = fetcher.fetch_new().await.unwrap();
    assert_eq!(report.downloaded, 1);
    assert!(root.path().join("b/run/events.1").exists());
}
