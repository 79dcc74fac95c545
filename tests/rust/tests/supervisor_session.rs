//! Supervisor sessions against a live readiness endpoint
//!
//! Stands up a real HTTP endpoint serving the scalar-series mapping, a
//! filesystem-backed remote, and a real subprocess, then drives full
//! sessions through the supervisor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use fetcher::Fetcher;
use serde_json::json;
use storage::MemoryBackend;
use supervisor::{HttpMetricsProbe, SessionOutcome, SyncSupervisor, ViewerProcess};
use sync_core::SupervisorConfig;
use tempfile::TempDir;
use tokio::time::sleep;

/// Serve the scalar-tags endpoint; empty until `ready_after` requests.
async fn start_metrics_stub(ready_after: usize) -> String {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/data/plugin/scalars/tags",
        get(move || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < ready_after {
                    Json(json!({}))
                } else {
                    Json(json!({"loss": [[1722772800.0, 1, 0.5]]}))
                }
            }
        }),
    );

    let port = portpicker::pick_unused_port().expect("No ports free");
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    sleep(Duration::from_millis(100)).await;

    format!("http://{}/data/plugin/scalars/tags", addr)
}

fn test_fetcher() -> (TempDir, Fetcher) {
    let root = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new("b"));
    backend.put_object("run/events.1", "x", chrono::Utc::now());
    let fetcher = Fetcher::with_backend(
        backend,
        vec!["run/".to_string()],
        root.path().to_path_buf(),
    );
    (root, fetcher)
}

fn config(max_wait_ms: u64) -> SupervisorConfig {
    SupervisorConfig {
        poll_interval: Duration::from_millis(50),
        max_wait: Duration::from_millis(max_wait_ms),
        request_timeout: Duration::from_millis(500),
    }
}

fn viewer(script: &str) -> ViewerProcess {
    ViewerProcess::spawn("/bin/sh", &["-c".to_string(), script.to_string()]).unwrap()
}

#[tokio::test]
async fn session_completes_once_metrics_appear() {
    let url = start_metrics_stub(2).await;
    let (root, fetcher) = test_fetcher();
    let probe = HttpMetricsProbe::new(url, Duration::from_millis(500)).unwrap();
    let mut supervisor = SyncSupervisor::new(fetcher, Box::new(probe), config(5_000));

    let outcome = supervisor
        .run(viewer("sleep 0.5; exit 0"))
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Completed { exit_code: 0 });
    // The mirror kept filling while the session ran.
    assert!(root.path().join("b/run/events.1").exists());
}

#[tokio::test]
async fn session_times_out_when_endpoint_never_serves_metrics() {
    let url = start_metrics_stub(usize::MAX).await;
    let (_root, fetcher) = test_fetcher();
    let probe = HttpMetricsProbe::new(url, Duration::from_millis(500)).unwrap();
    let mut supervisor = SyncSupervisor::new(fetcher, Box::new(probe), config(300));

    let start = std::time::Instant::now();
    let outcome = supervisor.run(viewer("sleep 30")).await.unwrap();

    assert_eq!(outcome, SessionOutcome::TimedOut);
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn session_tolerates_unreachable_endpoint_until_crash() {
    // Nothing listens on this port: every probe is a connection error,
    // which must stay transient until the subprocess exit is observed.
    let port = portpicker::pick_unused_port().expect("No ports free");
    let url = format!("http://127.0.0.1:{}/data/plugin/scalars/tags", port);
    let (_root, fetcher) = test_fetcher();
    let probe = HttpMetricsProbe::new(url, Duration::from_millis(200)).unwrap();
    let mut supervisor = SyncSupervisor::new(fetcher, Box::new(probe), config(10_000));

    let outcome = supervisor
        .run(viewer("sleep 0.2; exit 3"))
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Crashed { exit_code: 3 });
}
