//! Receiver behavior over the wire: signatures, malformed bodies, event-kind
//! filtering, queue overflow spill.

use crate::common::{event_body, post_signed, sign, spawn_receiver, SECRET};

#[tokio::test(flavor = "multi_thread")]
async fn valid_signature_enqueues_event() {
    let mut server = spawn_receiver(10, true).await;
    let body = event_body("doc-1");

    let resp = post_signed(&server.url, &body, SECRET).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "accepted");

    let event = server.rx.recv().await.unwrap();
    assert_eq!(event.model_id, "doc-1");
    assert_eq!(event.event, "documents.update");
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_secret_is_unauthorized() {
    let mut server = spawn_receiver(10, true).await;
    let body = event_body("doc-1");

    let resp = post_signed(&server.url, &body, "wrong-secret").await;
    assert_eq!(resp.status(), 401);

    // Nothing was enqueued.
    assert!(server.rx.try_recv().is_err());
    let stats = server.state.stats().snapshot(server.state.queue_depth());
    assert_eq!(stats.invalid_signatures, 1);
    assert_eq!(stats.valid_signatures, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_signature_header_is_unauthorized() {
    let server = spawn_receiver(10, true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/webhooks", server.url))
        .header("Content-Type", "application/json")
        .body(event_body("doc-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_body_is_unauthorized() {
    let server = spawn_receiver(10, true).await;
    let signed_for = event_body("doc-1");
    let sig = sign(SECRET, signed_for.as_bytes());

    let resp = reqwest::Client::new()
        .post(format!("{}/webhooks", server.url))
        .header("Content-Type", "application/json")
        .header("Outline-Signature", sig)
        .body(event_body("doc-2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_bad_request() {
    let server = spawn_receiver(10, true).await;
    let body = "{not json";
    let resp = post_signed(&server.url, body, SECRET).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_event_kind_is_acknowledged_not_enqueued() {
    let mut server = spawn_receiver(10, true).await;
    let body = serde_json::json!({
        "event": "collections.delete",
        "modelId": "col-1"
    })
    .to_string();

    let resp = post_signed(&server.url, &body, SECRET).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ignored");
    assert!(server.rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn non_post_method_is_rejected() {
    let server = spawn_receiver(10, true).await;
    let resp = reqwest::Client::new()
        .get(format!("{}/webhooks", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_validation_accepts_unsigned_requests() {
    let mut server = spawn_receiver(10, false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/webhooks", server.url))
        .header("Content-Type", "application/json")
        .body(event_body("doc-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(server.rx.recv().await.unwrap().model_id, "doc-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn full_queue_spills_to_overflow_and_returns_503() {
    // Queue of 1 with no drainer: the second event must spill.
    let server = spawn_receiver(1, true).await;

    let resp = post_signed(&server.url, &event_body("doc-1"), SECRET).await;
    assert_eq!(resp.status(), 200);

    let resp = post_signed(&server.url, &event_body("doc-2"), SECRET).await;
    assert_eq!(resp.status(), 503);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "spilled");

    assert_eq!(server.store.overflow_depth().await.unwrap(), 1);
    let spilled = server.store.next_overflow_batch(10).await.unwrap();
    assert!(spilled[0].payload.contains("doc-2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_event_lost_across_queue_and_overflow() {
    let server = spawn_receiver(5, true).await;
    let total = 12;
    for i in 0..total {
        let resp = post_signed(&server.url, &event_body(&format!("doc-{i}")), SECRET).await;
        assert!(resp.status() == 200 || resp.status() == 503);
    }
    let queued = server.state.queue_depth() as i64;
    let spilled = server.store.overflow_depth().await.unwrap();
    assert_eq!(queued + spilled, total as i64);
}
