//! Health stack: /health always up, /ready degrades per probe, /metrics
//! serves counters.

use std::sync::Arc;

use serve::{health_router, run_on_listener, HealthState, ReceiverOptions, ReceiverState, SignatureValidator};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use quill::ai::MockAi;
use quill::outline::MockWorkspace;
use quill::worker::{WorkerPool, WorkerPoolOptions};
use quill_store::Store;

struct HealthServer {
    url: String,
    workspace: Arc<MockWorkspace>,
    _db: NamedTempFile,
}

async fn spawn_health() -> HealthServer {
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(db.path()).unwrap());
    let workspace = Arc::new(MockWorkspace::new());
    let ai = Arc::new(MockAi::new());
    let pool = Arc::new(WorkerPool::start(
        WorkerPoolOptions::default(),
        store.clone(),
        CancellationToken::new(),
    ));
    let (receiver, _rx) = ReceiverState::new(
        SignatureValidator::new("s"),
        ReceiverOptions::default(),
        store.clone(),
    );
    let state = HealthState {
        workspace: workspace.clone(),
        ai,
        store,
        pool,
        receiver,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_on_listener(
        listener,
        health_router(state),
        CancellationToken::new(),
    ));

    HealthServer {
        url: format!("http://{addr}"),
        workspace,
        _db: db,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_always_ok() {
    let server = spawn_health().await;
    let resp = reqwest::get(format!("{}/health", server.url)).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn ready_reports_ok_when_probes_pass() {
    let server = spawn_health().await;
    let resp = reqwest::get(format!("{}/ready", server.url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn ready_degrades_when_workspace_probe_fails() {
    let server = spawn_health().await;
    server
        .workspace
        .fail_next("ping", quill::Error::Transient("down".into()));
    let resp = reqwest::get(format!("{}/ready", server.url)).await.unwrap();
    assert_eq!(resp.status(), 503);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "not ready");
    assert!(json["workspace"].as_str().unwrap().contains("down"));
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_serves_counters() {
    let server = spawn_health().await;
    let resp = reqwest::get(format!("{}/metrics", server.url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["receiver"]["total_received"].is_u64());
    assert!(json["pool"]["completed"].is_u64());
    assert_eq!(json["overflow_depth"], 0);
}
