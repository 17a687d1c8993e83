//! Event processor: fetch the document behind an event, detect its commands,
//! dispatch each to its handler, and enforce the marker cleanup contract.
//!
//! One failing command never starves the others: permanent failures are
//! cleaned up inline and the loop continues; the first transient failure is
//! carried out of the loop so the worker pool retries the whole event (already
//! completed commands removed their markers and will not re-run).

use std::sync::Arc;

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};

use crate::command::{remove_marker_line, Command, CommandDetector, CommandKind};
use crate::comments;
use crate::error::Error;
use crate::event::WebhookEvent;
use crate::handlers::{HandlerContext, HandlerRegistry, Outcome};
use crate::outline::{Document, DocumentPatch, WorkspaceClient};
use crate::worker::{Task, TaskFn};
use quill_store::{CommandStatus, Store};

/// Processor knobs, mapped from config by the orchestrator.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Commands the operator has enabled.
    pub available: Vec<CommandKind>,
    pub qna_enabled: bool,
    pub enhancement_enabled: bool,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            available: vec![
                CommandKind::Ask,
                CommandKind::File,
                CommandKind::Summarize,
                CommandKind::EnhanceTitle,
                CommandKind::Related,
            ],
            qna_enabled: true,
            enhancement_enabled: true,
        }
    }
}

impl ProcessorSettings {
    fn is_enabled(&self, kind: CommandKind) -> bool {
        if !self.available.contains(&kind) {
            return false;
        }
        match kind {
            CommandKind::Ask => self.qna_enabled,
            CommandKind::Summarize | CommandKind::EnhanceTitle => self.enhancement_enabled,
            _ => true,
        }
    }
}

pub struct EventProcessor {
    workspace: Arc<dyn WorkspaceClient>,
    registry: HandlerRegistry,
    store: Arc<Store>,
    detector: CommandDetector,
    settings: ProcessorSettings,
}

/// `hex(SHA-256(document_id || kind || args))`: audit key for one command
/// occurrence.
fn command_id(document_id: &str, kind: CommandKind, args: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(kind.marker().as_bytes());
    hasher.update(args.as_bytes());
    hex::encode(hasher.finalize())
}

impl EventProcessor {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        registry: HandlerRegistry,
        store: Arc<Store>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            workspace,
            registry,
            store,
            detector: CommandDetector::new(),
            settings,
        }
    }

    /// Processes one document event. Returns the first transient error so the
    /// pool's retry loop re-runs the remaining markers.
    pub async fn process_event(
        &self,
        event: &WebhookEvent,
        attempt: u32,
        task_id: &str,
    ) -> Result<(), Error> {
        let document = match self.workspace.get_document(&event.model_id).await {
            Ok(doc) => doc,
            Err(Error::NotFound(_)) => {
                // Deleted between event and processing; nothing left to do.
                tracing::debug!(document = %event.model_id, "document gone, skipping event");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let commands: Vec<Command> = self
            .detector
            .detect(&document.text)
            .into_iter()
            .filter(|c| c.kind.executable() && self.settings.is_enabled(c.kind))
            .collect();
        if commands.is_empty() {
            return Ok(());
        }
        tracing::info!(
            document = %document.id,
            commands = commands.len(),
            attempt,
            "processing document commands"
        );

        let mut pending_error: Option<Error> = None;
        for command in &commands {
            // Prior commands may have rewritten the text; work from fresh state
            // and skip markers that no longer exist.
            let fresh = self.workspace.get_document(&document.id).await?;
            if !self
                .detector
                .detect(&fresh.text)
                .iter()
                .any(|c| c.kind == command.kind && c.raw == command.raw)
            {
                continue;
            }

            match self.run_command(&fresh, command, attempt, task_id).await {
                Ok(()) => {}
                Err(e) if e.is_permanent() => {
                    // Cleaned up inside run_command; keep going.
                    tracing::warn!(
                        document = %document.id,
                        command = command.kind.marker(),
                        error = %e,
                        "command failed permanently"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        document = %document.id,
                        command = command.kind.marker(),
                        error = %e,
                        "command failed, will retry"
                    );
                    pending_error.get_or_insert(e);
                }
            }
        }

        match pending_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_command(
        &self,
        document: &Document,
        command: &Command,
        attempt: u32,
        task_id: &str,
    ) -> Result<(), Error> {
        let handler = match self.registry.get(command.kind) {
            Some(h) => h,
            None => return Ok(()),
        };
        let audit_id = command_id(&document.id, command.kind, &command.args);
        if let Err(e) = self
            .store
            .log_command(
                &audit_id,
                &document.id,
                command.kind.marker(),
                &command.args,
                CommandStatus::Processing,
            )
            .await
        {
            tracing::debug!(error = %e, "command audit write failed");
        }

        let ctx = HandlerContext {
            task_id: task_id.to_string(),
            attempt,
        };
        let result = handler.handle(document, command, &ctx).await;

        match result {
            Ok(outcome) => {
                if matches!(outcome, Outcome::Done | Outcome::Skipped) {
                    self.remove_marker(&document.id, &command.raw).await?;
                }
                self.finish_audit(&audit_id, CommandStatus::Completed, None).await;
                Ok(())
            }
            Err(e) if e.is_permanent() => {
                // Permanent: marker comes out, user gets told why.
                if let Err(cleanup) = self.remove_marker(&document.id, &command.raw).await {
                    tracing::warn!(error = %cleanup, "marker cleanup after permanent failure");
                }
                let body = comments::permanent_failure(command.kind.marker(), &e.to_string());
                if let Err(post) = self.workspace.create_comment(&document.id, &body).await {
                    tracing::warn!(error = %post, "failure comment not posted");
                }
                self.finish_audit(&audit_id, CommandStatus::Failed, Some(&e.to_string()))
                    .await;
                Err(e)
            }
            Err(e) => {
                // Transient: marker stays; tell the user once, not on every retry.
                if attempt == 1 {
                    let body =
                        comments::temporary_failure(command.kind.marker(), &e.to_string());
                    if let Err(post) = self.workspace.create_comment(&document.id, &body).await
                    {
                        tracing::warn!(error = %post, "temporary-failure comment not posted");
                    }
                }
                self.finish_audit(&audit_id, CommandStatus::Failed, Some(&e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn remove_marker(&self, document_id: &str, raw: &str) -> Result<(), Error> {
        let fresh = self.workspace.get_document(document_id).await?;
        let cleaned = remove_marker_line(&fresh.text, raw);
        if cleaned != fresh.text {
            self.workspace
                .update_document(
                    document_id,
                    DocumentPatch {
                        text: Some(cleaned),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(())
    }

    async fn finish_audit(&self, audit_id: &str, status: CommandStatus, error: Option<&str>) {
        if let Err(e) = self.store.finish_command(audit_id, status, error).await {
            tracing::debug!(error = %e, "command audit update failed");
        }
    }
}

/// Wraps an event into a pool task. The task ID (`process-{documentID}`) is
/// also the checkpoint key multi-step handlers write under, so DLQ entries
/// embed the right resume state.
pub fn event_task(processor: Arc<EventProcessor>, event: WebhookEvent) -> Task {
    let document_id = event.model_id.clone();
    let execute: TaskFn = Arc::new(move |attempt| {
        let processor = processor.clone();
        let event = event.clone();
        let fut: BoxFuture<'static, Result<(), Error>> = Box::pin(async move {
            let task_id = format!("process-{}", event.model_id);
            processor.process_event(&event, attempt, &task_id).await
        });
        fut
    });
    Task::new("process", document_id, execute)
}
