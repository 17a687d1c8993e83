//! Integration tests for quill_store::Store (table creation, dedup rows, DLQ,
//! checkpoints, overflow, catch-up). Uses multi_thread runtime so the store's
//! block_in_place is allowed.

use quill_store::{
    CatchupState, CommandStatus, DlqEntry, QuestionState, ReprocessStrategy, Store,
};
use tempfile::NamedTempFile;

fn question(hash: &str, doc: &str, processed_at_ms: i64) -> QuestionState {
    QuestionState {
        question_hash: hash.to_string(),
        document_id: doc.to_string(),
        normalized_question: "what is our deployment process".to_string(),
        processed_at_ms,
        answered: true,
        comment_id: Some("comment-1".to_string()),
        last_error: None,
        retry_count: 0,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn store_new_creates_db_reopen_same_path_works() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();

    let store1 = Store::new(&path).unwrap();
    store1.upsert_question(&question("h1", "doc-1", 42)).await.unwrap();
    drop(store1);

    let store2 = Store::new(&path).unwrap();
    let q = store2.get_question("h1").await.unwrap().unwrap();
    assert_eq!(q.document_id, "doc-1");
    assert!(q.answered);
    assert_eq!(q.comment_id.as_deref(), Some("comment-1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn get_question_missing_returns_none() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();
    assert!(store.get_question("nope").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn sweep_questions_removes_only_old_rows() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();
    store.upsert_question(&question("old", "d", 1_000)).await.unwrap();
    store.upsert_question(&question("new", "d", 2_000)).await.unwrap();

    let removed = store.sweep_questions(1_500).await.unwrap();
    assert_eq!(removed, 1);
    assert!(store.get_question("old").await.unwrap().is_none());
    assert!(store.get_question("new").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn checkpoint_roundtrip_and_delete() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();
    let steps = serde_json::json!({
        "document_moved": true,
        "search_terms_added": false,
    });

    store.put_checkpoint("file-doc-1", &steps).await.unwrap();
    let loaded = store.get_checkpoint("file-doc-1").await.unwrap().unwrap();
    assert_eq!(loaded["document_moved"], true);
    assert_eq!(loaded["search_terms_added"], false);

    store.delete_checkpoint("file-doc-1").await.unwrap();
    assert!(store.get_checkpoint("file-doc-1").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn checkpoint_upsert_replaces_steps() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();

    store
        .put_checkpoint("t", &serde_json::json!({"a": false}))
        .await
        .unwrap();
    store
        .put_checkpoint("t", &serde_json::json!({"a": true}))
        .await
        .unwrap();
    let loaded = store.get_checkpoint("t").await.unwrap().unwrap();
    assert_eq!(loaded["a"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn dlq_push_list_take() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();
    let entry = DlqEntry {
        id: 0,
        task_id: "file-doc-9".to_string(),
        kind: "file".to_string(),
        document_id: "doc-9".to_string(),
        failure_reason: "retries exhausted".to_string(),
        attempt_count: 3,
        first_failure_ms: 100,
        last_failure_ms: 300,
        error_details: "upstream 503".to_string(),
        checkpoint: Some(serde_json::json!({"document_moved": true})),
    };

    let id = store.push_dlq(&entry).await.unwrap();
    let listed = store.list_dlq(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].task_id, "file-doc-9");
    assert_eq!(listed[0].checkpoint.as_ref().unwrap()["document_moved"], true);

    let taken = store.take_dlq(id).await.unwrap();
    assert_eq!(taken.document_id, "doc-9");
    assert!(store.list_dlq(10).await.unwrap().is_empty());

    // Taking again is NotFound.
    assert!(store.take_dlq(id).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn overflow_fifo_and_depth() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();

    store.push_overflow("{\"event\":\"a\"}").await.unwrap();
    store.push_overflow("{\"event\":\"b\"}").await.unwrap();
    assert_eq!(store.overflow_depth().await.unwrap(), 2);

    let batch = store.next_overflow_batch(1).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert!(batch[0].payload.contains("\"a\""));

    store.delete_overflow(batch[0].id).await.unwrap();
    assert_eq!(store.overflow_depth().await.unwrap(), 1);
    let rest = store.next_overflow_batch(10).await.unwrap();
    assert!(rest[0].payload.contains("\"b\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_events_due_filtering() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();

    store
        .record_failed_event("{}", "boom", ReprocessStrategy::Delayed, 1_000, 1)
        .await
        .unwrap();
    store
        .record_failed_event("{}", "later", ReprocessStrategy::Delayed, 9_000, 1)
        .await
        .unwrap();
    store
        .record_failed_event("{}", "operator", ReprocessStrategy::Manual, 0, 3)
        .await
        .unwrap();
    store
        .record_failed_event("{}", "permanent", ReprocessStrategy::Skip, 0, 1)
        .await
        .unwrap();

    // Only the due, automatic row comes back.
    let due = store.due_failed_events(5_000, 10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].error, "boom");

    store
        .defer_failed_event(due[0].id, ReprocessStrategy::Manual, 0, "still failing")
        .await
        .unwrap();
    assert!(store.due_failed_events(5_000, 10).await.unwrap().is_empty());

    store.resolve_failed_event(due[0].id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn catchup_state_singleton_upsert() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();

    assert!(store.catchup_state().await.unwrap().is_none());

    store
        .save_catchup_state(&CatchupState {
            last_processed_time_ms: 10,
            last_document_id: Some("doc-1".to_string()),
            documents_processed: 2,
            duration_ms: 40,
        })
        .await
        .unwrap();
    store
        .save_catchup_state(&CatchupState {
            last_processed_time_ms: 99,
            last_document_id: None,
            documents_processed: 0,
            duration_ms: 5,
        })
        .await
        .unwrap();

    let s = store.catchup_state().await.unwrap().unwrap();
    assert_eq!(s.last_processed_time_ms, 99);
    assert!(s.last_document_id.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn command_log_upsert_and_finish() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();

    store
        .log_command("cmd-1", "doc-1", "/ai-file", "", CommandStatus::Processing)
        .await
        .unwrap();
    store
        .finish_command("cmd-1", CommandStatus::Completed, None)
        .await
        .unwrap();
    // Audit only; nothing to assert beyond "does not error" and re-log works.
    store
        .log_command("cmd-1", "doc-1", "/ai-file", "", CommandStatus::Processing)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn backup_snapshots_and_prunes() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.path()).unwrap();
    store.upsert_question(&question("h", "d", 1)).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let p1 = store.backup_to(dir.path(), 2).await.unwrap();
    assert!(p1.exists());

    // A restored copy opens and contains the row.
    let restored = Store::new(&p1).unwrap();
    assert!(restored.get_question("h").await.unwrap().is_some());
}
