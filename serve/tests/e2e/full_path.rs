//! Full ingress path: signed webhook -> queue -> drainer -> worker pool ->
//! document mutated. The same wiring the orchestrator builds.

use std::sync::Arc;
use std::time::Duration;

use serve::{
    run_on_listener, spawn_drainer, webhook_router, ReceiverOptions, ReceiverState,
    SignatureValidator,
};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::common::{event_body, post_signed, SECRET};
use quill::ai::{Classification, MockAi};
use quill::dedupe::Deduper;
use quill::handlers::{FileHandler, HandlerRegistry, HandlerSettings, QaHandler};
use quill::outline::{Collection, Document, MockWorkspace};
use quill::processor::{EventProcessor, ProcessorSettings};
use quill::taxonomy::{TaxonomyCache, TaxonomyOptions};
use quill::worker::{WorkerPool, WorkerPoolOptions};
use quill_store::Store;

#[tokio::test(flavor = "multi_thread")]
async fn signed_webhook_files_the_document_end_to_end() {
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(db.path()).unwrap());
    let workspace = Arc::new(MockWorkspace::new());
    let ai = Arc::new(MockAi::new());
    let cancel = CancellationToken::new();

    workspace.insert_collection(Collection {
        id: "col-eng".into(),
        name: "Engineering".into(),
        description: String::new(),
    });
    workspace.insert_document(Document {
        id: "doc-1".into(),
        title: "Pooling".into(),
        text: "/ai-file\n\nBody.".into(),
        collection_id: Some("inbox".into()),
        ..Default::default()
    });
    ai.push_classification(Classification {
        collection_id: "col-eng".into(),
        confidence: 0.95,
        reasoning: "clear".into(),
        alternatives: vec![],
        search_terms: vec!["pooling".into()],
    });

    let taxonomy = Arc::new(TaxonomyCache::new(
        workspace.clone(),
        TaxonomyOptions::default(),
    ));
    let settings = HandlerSettings::default();
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(FileHandler::new(
        workspace.clone(),
        ai.clone(),
        taxonomy,
        store.clone(),
        settings.clone(),
    )));
    registry.register(Arc::new(QaHandler::new(
        workspace.clone(),
        ai.clone(),
        Deduper::new(store.clone()),
        settings,
    )));
    let processor = Arc::new(EventProcessor::new(
        workspace.clone(),
        registry,
        store.clone(),
        ProcessorSettings::default(),
    ));
    let pool = Arc::new(WorkerPool::start(
        WorkerPoolOptions {
            workers: 2,
            queue_size: 16,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            ..WorkerPoolOptions::default()
        },
        store.clone(),
        cancel.clone(),
    ));

    let (state, rx) = ReceiverState::new(
        SignatureValidator::new(SECRET),
        ReceiverOptions::default(),
        store.clone(),
    );
    spawn_drainer(
        rx,
        processor,
        pool.clone(),
        store.clone(),
        state.stats(),
        cancel.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_on_listener(
        listener,
        webhook_router(state.clone()),
        cancel.clone(),
    ));

    let resp = post_signed(&format!("http://{addr}"), &event_body("doc-1"), SECRET).await;
    assert_eq!(resp.status(), 200);

    for _ in 0..200 {
        if pool.stats().completed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let doc = workspace.document("doc-1").unwrap();
    assert_eq!(doc.collection_id.as_deref(), Some("col-eng"));
    assert!(!doc.text.contains("/ai-file"));
    assert_eq!(workspace.comments_for("doc-1").len(), 1);

    let stats = state.stats().snapshot(state.queue_depth());
    assert_eq!(stats.total_received, 1);
    assert_eq!(stats.valid_signatures, 1);
    assert_eq!(stats.processed_successfully, 1);
}
