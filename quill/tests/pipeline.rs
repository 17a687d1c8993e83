//! End-to-end pipeline tests with mock clients and a real SQLite store:
//! high-confidence filing, the low-confidence guidance loop, question dedup,
//! idempotent summarize, checkpoint resume, catch-up, and overflow drain.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use quill::ai::{Alternative, Answer, Citation, Classification, MockAi};
use quill::dedupe::Deduper;
use quill::handlers::{
    EnhanceTitleHandler, FileHandler, HandlerRegistry, HandlerSettings, QaHandler,
    RelatedHandler, SummarizeHandler,
};
use quill::outline::{Collection, Document, MockWorkspace, SearchHit};
use quill::processor::{EventProcessor, ProcessorSettings};
use quill::recovery::{Recovery, RecoveryOptions};
use quill::taxonomy::{TaxonomyCache, TaxonomyOptions};
use quill::worker::{WorkerPool, WorkerPoolOptions};
use quill::WebhookEvent;
use quill_store::{CatchupState, Store};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

struct Fixture {
    workspace: Arc<MockWorkspace>,
    ai: Arc<MockAi>,
    store: Arc<Store>,
    processor: Arc<EventProcessor>,
    _db: NamedTempFile,
}

fn fixture() -> Fixture {
    let workspace = Arc::new(MockWorkspace::new());
    let ai = Arc::new(MockAi::new());
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(db.path()).unwrap());

    workspace.insert_collection(Collection {
        id: "inbox".into(),
        name: "Inbox".into(),
        description: "Unfiled".into(),
    });
    workspace.insert_collection(Collection {
        id: "col-eng".into(),
        name: "Engineering".into(),
        description: "Technical docs".into(),
    });
    workspace.insert_collection(Collection {
        id: "col-product".into(),
        name: "Product".into(),
        description: "Product docs".into(),
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
        taxonomy.clone(),
        store.clone(),
        settings.clone(),
    )));
    registry.register(Arc::new(QaHandler::new(
        workspace.clone(),
        ai.clone(),
        Deduper::new(store.clone()),
        settings.clone(),
    )));
    registry.register(Arc::new(SummarizeHandler::new(
        workspace.clone(),
        ai.clone(),
        settings.clone(),
    )));
    registry.register(Arc::new(EnhanceTitleHandler::new(
        workspace.clone(),
        ai.clone(),
        settings,
    )));
    registry.register(Arc::new(RelatedHandler::new(workspace.clone(), ai.clone())));

    let processor = Arc::new(EventProcessor::new(
        workspace.clone(),
        registry,
        store.clone(),
        ProcessorSettings::default(),
    ));

    Fixture {
        workspace,
        ai,
        store,
        processor,
        _db: db,
    }
}

fn classification_high() -> Classification {
    Classification {
        collection_id: "col-eng".into(),
        confidence: 0.95,
        reasoning: "infrastructure topic".into(),
        alternatives: vec![],
        search_terms: vec!["pooling".into(), "pgbouncer".into(), "postgresql".into()],
    }
}

async fn process(fx: &Fixture, document_id: &str) -> Result<(), quill::Error> {
    let event = WebhookEvent::synthetic(document_id);
    let task_id = format!("process-{document_id}");
    fx.processor.process_event(&event, 1, &task_id).await
}

#[tokio::test(flavor = "multi_thread")]
async fn high_confidence_filing_moves_and_cleans_up() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-1".into(),
        title: "PostgreSQL Connection Pooling".into(),
        text: "/ai-file\n\nHow we pool connections.".into(),
        collection_id: Some("inbox".into()),
        ..Default::default()
    });
    fx.ai.push_classification(classification_high());

    process(&fx, "doc-1").await.unwrap();

    let doc = fx.workspace.document("doc-1").unwrap();
    assert_eq!(doc.collection_id.as_deref(), Some("col-eng"));
    assert!(!doc.text.contains("/ai-file"));
    assert!(doc.text.contains("<!-- AI-SEARCH-TERMS-START -->"));
    assert!(doc.text.contains("pooling, pgbouncer, postgresql"));

    let comments = fx.workspace.comments_for("doc-1");
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.contains("Filed to **Engineering** (95%)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn low_confidence_converts_then_guidance_files() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-1".into(),
        title: "PostgreSQL Connection Pooling".into(),
        text: "/ai-file\n\nHow we pool connections.".into(),
        collection_id: Some("inbox".into()),
        ..Default::default()
    });
    fx.ai.push_classification(Classification {
        collection_id: "col-eng".into(),
        confidence: 0.55,
        reasoning: "could be engineering".into(),
        alternatives: vec![
            Alternative {
                collection_id: "col-product".into(),
                confidence: 0.50,
                reasoning: "mentions roadmap".into(),
            },
            Alternative {
                collection_id: "inbox".into(),
                confidence: 0.40,
                reasoning: String::new(),
            },
        ],
        search_terms: vec![],
    });

    // Run 1: conversion in place, no move, uncertainty comment.
    process(&fx, "doc-1").await.unwrap();
    let doc = fx.workspace.document("doc-1").unwrap();
    assert!(doc.text.contains("?ai-file"));
    assert!(!doc.text.contains("/ai-file"));
    assert_eq!(doc.collection_id.as_deref(), Some("inbox"));
    assert_eq!(fx.workspace.move_calls.load(Ordering::SeqCst), 0);
    let comments = fx.workspace.comments_for("doc-1");
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.contains("❓"));
    assert!(comments[0].body.contains("Product"));

    // User promotes the marker with guidance; webhook re-fires.
    let promoted = doc.text.replace("?ai-file", "/ai-file backend implementation");
    fx.workspace.insert_document(Document {
        text: promoted,
        ..doc.clone()
    });
    fx.ai.push_classification(Classification {
        collection_id: "col-eng".into(),
        confidence: 0.9,
        reasoning: "guided".into(),
        alternatives: vec![],
        search_terms: vec![],
    });

    // Run 2: both markers gone, moved, success comment.
    process(&fx, "doc-1").await.unwrap();
    let doc = fx.workspace.document("doc-1").unwrap();
    assert!(!doc.text.contains("/ai-file"));
    assert!(!doc.text.contains("?ai-file"));
    assert_eq!(doc.collection_id.as_deref(), Some("col-eng"));
    let comments = fx.workspace.comments_for("doc-1");
    assert_eq!(comments.len(), 2);
    assert!(comments[1].body.contains("✓ Filed to **Engineering**"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dual_markers_removed_together_on_success() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-1".into(),
        title: "Pooling".into(),
        text: "/ai-file backend\n?ai-file stale breadcrumb\n\nBody.".into(),
        collection_id: Some("inbox".into()),
        ..Default::default()
    });
    fx.ai.push_classification(classification_high());

    process(&fx, "doc-1").await.unwrap();

    let doc = fx.workspace.document("doc-1").unwrap();
    assert!(!doc.text.contains("/ai-file"));
    assert!(!doc.text.contains("?ai-file"));
    assert!(doc.text.contains("Body."));
}

#[tokio::test(flavor = "multi_thread")]
async fn question_answered_once_despite_duplicate_webhook() {
    let fx = fixture();
    let text = "/ai What is our deployment process?\n\nBody.";
    fx.workspace.insert_document(Document {
        id: "doc-2".into(),
        title: "Deploys".into(),
        text: text.into(),
        ..Default::default()
    });
    fx.workspace.set_search_results(vec![SearchHit {
        document_id: "doc-9".into(),
        title: "Deploy guide".into(),
        context: "Deploys go through CI with manual approval.".into(),
        url: Some("https://wiki/doc/9".into()),
    }]);
    fx.ai.set_answer(Answer {
        answer: "Deploys go through CI.".into(),
        citations: vec![Citation {
            document_title: "Deploy guide".into(),
            document_url: "https://wiki/doc/9".into(),
        }],
        confidence: 0.8,
    });

    process(&fx, "doc-2").await.unwrap();
    assert_eq!(fx.ai.answer_calls.load(Ordering::SeqCst), 1);
    let comments = fx.workspace.comments_for("doc-2");
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.contains("[Deploy guide](https://wiki/doc/9)"));
    let doc = fx.workspace.document("doc-2").unwrap();
    assert!(!doc.text.contains("/ai "));

    // Duplicate delivery with the marker still present (stale replay): the
    // dedup record short-circuits before any AI call.
    fx.workspace.insert_document(Document {
        id: "doc-2".into(),
        title: "Deploys".into(),
        text: text.into(),
        ..Default::default()
    });
    process(&fx, "doc-2").await.unwrap();
    assert_eq!(fx.ai.answer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.workspace.comments_for("doc-2").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn inline_answer_replaces_the_marker_line() {
    let workspace = Arc::new(MockWorkspace::new());
    let ai = Arc::new(MockAi::new());
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(db.path()).unwrap());

    workspace.insert_document(Document {
        id: "doc-inline".into(),
        title: "Deploys".into(),
        text: "intro\n/ai What is our deployment process?\noutro".into(),
        ..Default::default()
    });
    ai.set_answer(Answer {
        answer: "Deploys go through CI.".into(),
        citations: vec![],
        confidence: 0.8,
    });

    let settings = HandlerSettings {
        answer_method: quill::handlers::AnswerMethod::Inline,
        ..HandlerSettings::default()
    };
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(QaHandler::new(
        workspace.clone(),
        ai.clone(),
        Deduper::new(store.clone()),
        settings,
    )));
    let processor = Arc::new(EventProcessor::new(
        workspace.clone(),
        registry,
        store,
        ProcessorSettings::default(),
    ));

    let event = WebhookEvent::synthetic("doc-inline");
    processor
        .process_event(&event, 1, "process-doc-inline")
        .await
        .unwrap();

    let doc = workspace.document("doc-inline").unwrap();
    assert!(doc.text.contains("> **Q**: What is our deployment process?"));
    assert!(doc.text.contains("Deploys go through CI."));
    assert!(!doc.text.contains("/ai "));
    assert!(doc.text.starts_with("intro\n"));
    assert!(doc.text.ends_with("outro"));
    // No comment in inline mode.
    assert!(workspace.comments_for("doc-inline").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn summarize_replaces_existing_block_in_place() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-3".into(),
        title: "Runbook".into(),
        text: "<!-- AI-SUMMARY-START -->\n> **Summary**: Old.\n<!-- AI-SUMMARY-END -->\n\nBody.\n/summarize".into(),
        ..Default::default()
    });
    fx.ai.set_summary("New.");

    process(&fx, "doc-3").await.unwrap();

    let doc = fx.workspace.document("doc-3").unwrap();
    assert!(doc.text.starts_with(
        "<!-- AI-SUMMARY-START -->\n> **Summary**: New.\n<!-- AI-SUMMARY-END -->"
    ));
    assert_eq!(doc.text.matches("AI-SUMMARY-START").count(), 1);
    assert!(doc.text.contains("Body."));
    assert!(!doc.text.contains("Old."));
    assert!(!doc.text.contains("/summarize"));
}

#[tokio::test(flavor = "multi_thread")]
async fn filing_resumes_from_checkpoint_after_partial_failure() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-4".into(),
        title: "Pooling".into(),
        text: "/ai-file\n\nBody.".into(),
        collection_id: Some("inbox".into()),
        ..Default::default()
    });
    fx.ai.push_classification(classification_high());
    // Move succeeds; the search-terms update then fails transiently.
    fx.workspace.fail_next(
        "update_document",
        quill::Error::Transient("upstream 503".into()),
    );

    let err = process(&fx, "doc-4").await.unwrap_err();
    assert!(err.is_transient());
    let checkpoint = fx
        .store
        .get_checkpoint("process-doc-4")
        .await
        .unwrap()
        .expect("partial progress checkpointed");
    assert_eq!(checkpoint["document_moved"], true);
    assert_eq!(checkpoint["search_terms_added"], false);

    // Retry: the move step is skipped, the rest completes.
    fx.ai.push_classification(classification_high());
    let event = WebhookEvent::synthetic("doc-4");
    fx.processor
        .process_event(&event, 2, "process-doc-4")
        .await
        .unwrap();

    assert_eq!(fx.workspace.move_calls.load(Ordering::SeqCst), 1);
    let doc = fx.workspace.document("doc-4").unwrap();
    assert!(!doc.text.contains("/ai-file"));
    assert!(doc.text.contains("AI-SEARCH-TERMS"));
    // One temporary-failure note from attempt 1, then the success comment.
    let comments = fx.workspace.comments_for("doc-4");
    assert_eq!(comments.len(), 2);
    assert!(comments[1].body.contains("✓ Filed to"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_collection_from_ai_is_invalid() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-5".into(),
        title: "Pooling".into(),
        text: "/ai-file\n\nBody.".into(),
        collection_id: Some("inbox".into()),
        ..Default::default()
    });
    fx.ai.push_classification(Classification {
        collection_id: "col-hallucinated".into(),
        confidence: 0.99,
        reasoning: String::new(),
        alternatives: vec![],
        search_terms: vec![],
    });

    let err = process(&fx, "doc-5").await.unwrap_err();
    assert!(matches!(err, quill::Error::InvalidAiResponse(_)));
    // Marker stays for the retry.
    assert!(fx.workspace.document("doc-5").unwrap().text.contains("/ai-file"));
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_handler_failure_removes_marker_and_comments() {
    let fx = fixture();
    fx.workspace.insert_document(Document {
        id: "doc-6".into(),
        title: "Broken".into(),
        text: "/related\n\nBody.".into(),
        ..Default::default()
    });
    fx.workspace
        .fail_next("search_documents", quill::Error::Auth("401".into()));

    // The event itself completes: permanent failures are cleaned up inline.
    process(&fx, "doc-6").await.unwrap();

    let doc = fx.workspace.document("doc-6").unwrap();
    assert!(!doc.text.contains("/related"));
    let comments = fx.workspace.comments_for("doc-6");
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.contains("❌"));
}

#[tokio::test(flavor = "multi_thread")]
async fn catch_up_after_long_downtime_processes_marker_documents() {
    let fx = fixture();
    for id in ["doc-a", "doc-b"] {
        fx.workspace.insert_document(Document {
            id: id.into(),
            title: "Pending filing".into(),
            text: "/ai-file\n\nBody.".into(),
            collection_id: Some("inbox".into()),
            ..Default::default()
        });
        fx.ai.push_classification(classification_high());
    }
    fx.workspace.set_search_results(vec![
        SearchHit {
            document_id: "doc-a".into(),
            title: "Pending filing".into(),
            context: "/ai-file".into(),
            url: None,
        },
        SearchHit {
            document_id: "doc-b".into(),
            title: "Pending filing".into(),
            context: "/ai-file".into(),
            url: None,
        },
    ]);
    let thirty_hours_ago = chrono::Utc::now().timestamp_millis() - 30 * 3600 * 1000;
    fx.store
        .save_catchup_state(&CatchupState {
            last_processed_time_ms: thirty_hours_ago,
            last_document_id: None,
            documents_processed: 0,
            duration_ms: 0,
        })
        .await
        .unwrap();

    let pool = Arc::new(WorkerPool::start(
        WorkerPoolOptions {
            workers: 2,
            queue_size: 16,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            ..WorkerPoolOptions::default()
        },
        fx.store.clone(),
        CancellationToken::new(),
    ));
    let recovery = Recovery::new(
        fx.workspace.clone(),
        fx.store.clone(),
        fx.processor.clone(),
        pool.clone(),
        RecoveryOptions::default(),
    );

    let enqueued = recovery.catch_up().await.unwrap();
    assert_eq!(enqueued, 2);

    for _ in 0..200 {
        if pool.stats().completed == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for id in ["doc-a", "doc-b"] {
        let doc = fx.workspace.document(id).unwrap();
        assert_eq!(doc.collection_id.as_deref(), Some("col-eng"));
        assert!(!doc.text.contains("/ai-file"));
    }
    let state = fx.store.catchup_state().await.unwrap().unwrap();
    assert!(state.last_processed_time_ms > thirty_hours_ago);
    assert_eq!(state.documents_processed, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn overflow_drain_requeues_spilled_events() {
    let fx = fixture();
    for i in 0..3 {
        fx.workspace.insert_document(Document {
            id: format!("doc-of-{i}"),
            title: "Spilled".into(),
            text: "/ai-file\n\nBody.".into(),
            collection_id: Some("inbox".into()),
            ..Default::default()
        });
        fx.ai.push_classification(classification_high());
        let event = WebhookEvent::synthetic(format!("doc-of-{i}"));
        fx.store
            .push_overflow(&serde_json::to_string(&event).unwrap())
            .await
            .unwrap();
    }
    assert_eq!(fx.store.overflow_depth().await.unwrap(), 3);

    let pool = Arc::new(WorkerPool::start(
        WorkerPoolOptions {
            workers: 2,
            queue_size: 16,
            ..WorkerPoolOptions::default()
        },
        fx.store.clone(),
        CancellationToken::new(),
    ));
    let recovery = Recovery::new(
        fx.workspace.clone(),
        fx.store.clone(),
        fx.processor.clone(),
        pool.clone(),
        RecoveryOptions::default(),
    );

    let drained = recovery.drain_overflow().await.unwrap();
    assert_eq!(drained, 3);
    assert_eq!(fx.store.overflow_depth().await.unwrap(), 0);

    for _ in 0..200 {
        if pool.stats().completed == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for i in 0..3 {
        let doc = fx.workspace.document(&format!("doc-of-{i}")).unwrap();
        assert_eq!(doc.collection_id.as_deref(), Some("col-eng"));
    }
}
