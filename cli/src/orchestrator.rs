//! Orchestrator: builds every subsystem leaves-first, passes references (no
//! globals), spawns the periodic controllers, and tears everything down in
//! reverse order on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::Config;
use quill::ai::HttpAiClient;
use quill::command::CommandKind;
use quill::dedupe::Deduper;
use quill::handlers::{
    AnswerMethod, EnhanceTitleHandler, FileHandler, HandlerRegistry, HandlerSettings,
    QaHandler, RelatedHandler, SummarizeHandler,
};
use quill::outline::HttpWorkspaceClient;
use quill::processor::{EventProcessor, ProcessorSettings};
use quill::recovery::{Recovery, RecoveryOptions};
use quill::taxonomy::{TaxonomyCache, TaxonomyOptions};
use quill::worker::{spawn_watchdog, WorkerPool, WorkerPoolOptions};
use quill_store::Store;
use serve::{
    health_router, run_on_listener, spawn_drainer, webhook_router, HealthState,
    ReceiverOptions, ReceiverState, SignatureValidator,
};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
const DRAIN_INTERVAL: Duration = Duration::from_secs(300);
const REPROCESS_INTERVAL: Duration = Duration::from_secs(300);
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const CHECKPOINT_TTL: Duration = Duration::from_secs(3600);
const BACKUP_RETAIN: usize = 7;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Leaves first: store, then clients, then everything that borrows them.
    let store = Arc::new(
        Store::new(&config.persistence.database_path).context("open database")?,
    );
    let workspace = Arc::new(HttpWorkspaceClient::new(
        &config.outline.api_endpoint,
        &config.outline.api_key,
        config.outline.rate_limit_per_minute,
    ));
    let ai = Arc::new(HttpAiClient::new(
        &config.ai.endpoint,
        &config.ai.api_key,
        &config.ai.model,
        Duration::from_secs(config.ai.request_timeout_secs),
        config.ai.max_tokens,
        config.ai.rate_limit_per_minute,
    ));

    let taxonomy = Arc::new(TaxonomyCache::new(
        workspace.clone(),
        TaxonomyOptions {
            cache_ttl: Duration::from_secs(config.taxonomy.cache_ttl_secs),
            include_sample_documents: config.taxonomy.include_sample_documents,
            max_samples_per_collection: config.taxonomy.max_samples_per_collection,
        },
    ));

    let settings = HandlerSettings {
        confidence_threshold: config.ai.confidence_threshold,
        max_alternatives: 3,
        respect_user_ownership: config.enhancement.respect_user_ownership,
        max_context_documents: config.qna.max_context_documents,
        answer_method: match config.qna.answer_method {
            config::AnswerMethod::Comment => AnswerMethod::Comment,
            config::AnswerMethod::Inline => AnswerMethod::Inline,
        },
        add_summaries: config.enhancement.enabled && config.enhancement.add_summaries,
        enhance_titles: config.enhancement.enabled && config.enhancement.enhance_titles,
    };
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
        ProcessorSettings {
            available: config
                .commands
                .available
                .iter()
                .filter_map(|m| CommandKind::from_marker(m))
                .collect(),
            qna_enabled: config.qna.enabled,
            enhancement_enabled: config.enhancement.enabled,
        },
    ));

    let pool = Arc::new(WorkerPool::start(
        WorkerPoolOptions {
            workers: config.service.max_concurrent_workers,
            queue_size: config.webhooks.queue_size,
            task_timeout: Duration::from_secs(config.processing.task_timeout_secs),
            max_attempts: config.processing.max_retries.max(1),
            backoff_base: Duration::from_secs(config.processing.retry_backoff_base_secs),
            backoff_max: Duration::from_secs(config.processing.retry_backoff_max_secs),
        },
        store.clone(),
        cancel.clone(),
    ));
    let watchdog = spawn_watchdog(pool.heartbeats(), pool.task_timeout(), cancel.clone());

    let recovery = Arc::new(Recovery::new(
        workspace.clone(),
        store.clone(),
        processor.clone(),
        pool.clone(),
        RecoveryOptions::default(),
    ));

    let mut listeners: Vec<JoinHandle<()>> = Vec::new();

    // Webhook receiver, when enabled.
    let receiver_state = if config.webhooks.enabled {
        let mut validator = SignatureValidator::new(&config.outline.webhook_secret);
        if let Some(prev) = &config.outline.previous_webhook_secret {
            validator = validator.with_previous(prev, chrono::Duration::hours(24));
        }
        let (state, rx) = ReceiverState::new(
            validator,
            ReceiverOptions {
                path: config.webhooks.path.clone(),
                events: config.webhooks.events.clone(),
                signature_validation: config.webhooks.signature_validation,
                queue_size: config.webhooks.queue_size,
            },
            store.clone(),
        );
        spawn_drainer(
            rx,
            processor.clone(),
            pool.clone(),
            store.clone(),
            state.stats(),
            cancel.clone(),
        );

        let addr = format!("0.0.0.0:{}", config.webhooks.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("bind webhook listener on {addr}"))?;
        let router = webhook_router(state.clone());
        let cancel_for_listener = cancel.clone();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = run_on_listener(listener, router, cancel_for_listener).await {
                tracing::error!(error = %e, "webhook listener failed");
            }
        }));
        state
    } else {
        tracing::warn!("webhooks disabled, relying on fallback polling");
        let (state, _rx) = ReceiverState::new(
            SignatureValidator::new(""),
            ReceiverOptions {
                queue_size: config.webhooks.queue_size,
                ..ReceiverOptions::default()
            },
            store.clone(),
        );
        state
    };

    // Health stack on its own port.
    {
        let addr = format!("0.0.0.0:{}", config.service.health_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("bind health listener on {addr}"))?;
        let router = health_router(HealthState {
            workspace: workspace.clone(),
            ai: ai.clone(),
            store: store.clone(),
            pool: pool.clone(),
            receiver: receiver_state,
        });
        let cancel_for_listener = cancel.clone();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = run_on_listener(listener, router, cancel_for_listener).await {
                tracing::error!(error = %e, "health listener failed");
            }
        }));
    }

    // Catch-up once at startup, then the periodic controllers.
    {
        let recovery = recovery.clone();
        tokio::spawn(async move {
            if let Err(e) = recovery.catch_up().await {
                tracing::warn!(error = %e, "startup catch-up failed");
            }
        });
    }
    spawn_periodic("overflow-drain", DRAIN_INTERVAL, cancel.clone(), {
        let recovery = recovery.clone();
        move || {
            let recovery = recovery.clone();
            async move { recovery.drain_overflow().await.map(|_| ()) }
        }
    });
    spawn_periodic("failed-event-reprocessor", REPROCESS_INTERVAL, cancel.clone(), {
        let recovery = recovery.clone();
        move || {
            let recovery = recovery.clone();
            async move { recovery.reprocess_failed().await.map(|_| ()) }
        }
    });
    let question_retention =
        Duration::from_secs(config.persistence.question_retention_days as u64 * 86400);
    spawn_periodic("state-sweep", SWEEP_INTERVAL, cancel.clone(), {
        let recovery = recovery.clone();
        move || {
            let recovery = recovery.clone();
            async move { recovery.sweep(question_retention, CHECKPOINT_TTL).await }
        }
    });
    spawn_periodic(
        "taxonomy-warmup",
        Duration::from_secs(config.taxonomy.cache_ttl_secs.max(2) / 2),
        cancel.clone(),
        {
            let taxonomy = taxonomy.clone();
            move || {
                let taxonomy = taxonomy.clone();
                async move { taxonomy.refresh().await }
            }
        },
    );
    if config.webhooks.fallback_polling.enabled {
        spawn_periodic(
            "fallback-polling",
            Duration::from_secs(config.webhooks.fallback_polling.interval_secs),
            cancel.clone(),
            {
                let recovery = recovery.clone();
                move || {
                    let recovery = recovery.clone();
                    async move { recovery.poll_markers().await.map(|_| ()) }
                }
            },
        );
    }
    if config.persistence.backup_enabled {
        let backup_dir = std::path::PathBuf::from(format!(
            "{}.backups",
            config.persistence.database_path
        ));
        spawn_periodic(
            "backup",
            Duration::from_secs(config.persistence.backup_interval_secs),
            cancel.clone(),
            {
                let store = store.clone();
                move || {
                    let store = store.clone();
                    let dir = backup_dir.clone();
                    async move { store.backup_to(&dir, BACKUP_RETAIN).await.map(|_| ()) }
                }
            },
        );
    }

    tracing::info!(
        workers = config.service.max_concurrent_workers,
        webhook_port = config.webhooks.port,
        health_port = config.service.health_port,
        "quill started"
    );

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");

    // Reverse order: stop intake, let workers finish, drop listeners.
    cancel.cancel();
    if let Err(e) = pool.stop(SHUTDOWN_DEADLINE).await {
        tracing::warn!(error = %e, "worker pool stop timed out");
    }
    let _ = watchdog.await;
    for listener in listeners {
        let _ = listener.await;
    }
    tracing::info!("quill stopped");
    Ok(())
}

/// Spawns a cancellable interval task. Errors are logged, never fatal.
fn spawn_periodic<F, Fut, E>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet.
        timer.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            if let Err(e) = tick().await {
                tracing::warn!(task = name, error = %e, "periodic task failed");
            }
        }
        tracing::debug!(task = name, "periodic task stopped");
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed, using ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
