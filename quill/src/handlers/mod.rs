//! Command handlers: one per executable command kind, dispatched through a
//! process-scoped registry.
//!
//! Handlers own the workspace side-effects of their command. The processor owns
//! marker cleanup, except where a handler rewrites the document text itself and
//! reports so through its [`Outcome`].

mod enhance;
mod file;
mod qa;
mod related;

pub use enhance::{EnhanceTitleHandler, SummarizeHandler};
pub use file::{FileHandler, FilingCheckpoint};
pub use qa::{extract_keywords, QaHandler};
pub use related::RelatedHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{Command, CommandKind};
use crate::error::Error;
use crate::outline::Document;

/// Where `/ai` answers land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerMethod {
    /// Post the answer as a comment (default).
    #[default]
    Comment,
    /// Replace the marker line with the answer inside the document text.
    Inline,
}

/// Handler knobs, mapped from config by the orchestrator.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub confidence_threshold: f64,
    pub max_alternatives: usize,
    pub respect_user_ownership: bool,
    pub max_context_documents: usize,
    pub answer_method: AnswerMethod,
    pub add_summaries: bool,
    pub enhance_titles: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_alternatives: 3,
            respect_user_ownership: true,
            max_context_documents: 5,
            answer_method: AnswerMethod::Comment,
            add_summaries: true,
            enhance_titles: true,
        }
    }
}

/// Per-invocation context a handler may need beyond the document.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Worker-pool task ID; multi-step handlers checkpoint under it.
    pub task_id: String,
    /// 1-based attempt number of the surrounding task.
    pub attempt: u32,
}

/// What the handler did, so the processor knows whether marker cleanup is
/// still its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Side-effects done; the marker is still in the text.
    Done,
    /// Side-effects done and the handler already removed the marker(s).
    MarkerRemoved,
    /// Low-confidence filing: `/ai-file` became `?ai-file` in place. The
    /// conversion is the persistence; nothing to clean up.
    ConvertedToPending,
    /// Nothing to do (duplicate question, feature disabled).
    Skipped,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn kind(&self) -> CommandKind;

    async fn handle(
        &self,
        document: &Document,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<Outcome, Error>;
}

/// kind -> handler map, built once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: CommandKind) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        self.handlers.keys().copied().collect()
    }
}
