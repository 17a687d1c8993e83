//! Shared helpers for e2e tests: spawn the receiver on 127.0.0.1:0 and send
//! signed webhook requests against it.

use std::sync::Arc;

use serve::{run_on_listener, webhook_router, ReceiverOptions, ReceiverState, SignatureValidator};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quill::WebhookEvent;
use quill_store::Store;

pub const SECRET: &str = "test-webhook-secret";

pub struct TestServer {
    pub url: String,
    pub state: ReceiverState,
    pub rx: mpsc::Receiver<WebhookEvent>,
    pub store: Arc<Store>,
    pub cancel: CancellationToken,
    _db: NamedTempFile,
}

/// Spawns a receiver with the given queue size; returns the base URL and the
/// queue's consuming end so tests can observe enqueued events directly.
pub async fn spawn_receiver(queue_size: usize, validation: bool) -> TestServer {
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(db.path()).unwrap());
    let options = ReceiverOptions {
        queue_size,
        signature_validation: validation,
        ..ReceiverOptions::default()
    };
    let (state, rx) = ReceiverState::new(SignatureValidator::new(SECRET), options, store.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(run_on_listener(
        listener,
        webhook_router(state.clone()),
        cancel.clone(),
    ));

    TestServer {
        url: format!("http://{addr}"),
        state,
        rx,
        store,
        cancel,
        _db: db,
    }
}

pub fn event_body(document_id: &str) -> String {
    serde_json::json!({
        "event": "documents.update",
        "model": "documents",
        "modelId": document_id,
        "actorId": "user-1",
        "payload": {}
    })
    .to_string()
}

/// POST a body with an `Outline-Signature` computed under `secret`.
pub async fn post_signed(url: &str, body: &str, secret: &str) -> reqwest::Response {
    let sig = sign(secret, body.as_bytes());
    reqwest::Client::new()
        .post(format!("{url}/webhooks"))
        .header("Content-Type", "application/json")
        .header("Outline-Signature", sig)
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

/// Same HMAC the receiver computes; kept local so the tests break if the
/// receiver's algorithm drifts.
pub fn sign(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
