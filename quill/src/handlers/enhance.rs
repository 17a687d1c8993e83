//! `/summarize` and `/enhance-title`: idempotent document enhancements.
//!
//! The summary lives in a hidden-marker block near the top. Title enhancement
//! is not marker-based: it only ever overwrites titles that match the vague
//! rule, and only above the confidence gate.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CommandHandler, HandlerContext, HandlerSettings, Outcome};
use crate::ai::AiClient;
use crate::command::{remove_marker_line, Command, CommandKind};
use crate::editor::{apply_section, Section};
use crate::error::Error;
use crate::outline::{Document, DocumentPatch, WorkspaceClient};

/// Titles that say nothing. Compared case-insensitively after trimming.
const VAGUE_TITLES: &[&str] = &[
    "untitled",
    "draft",
    "notes",
    "new document",
    "document",
    "temp",
    "test",
];

const TITLE_CONFIDENCE_GATE: f64 = 0.7;

/// Exact vague match, shorter than 5 chars, or nothing but digits/whitespace.
pub(crate) fn is_vague_title(title: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.len() < 5 {
        return true;
    }
    if VAGUE_TITLES.contains(&trimmed.to_lowercase().as_str()) {
        return true;
    }
    trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace())
}

pub struct SummarizeHandler {
    workspace: Arc<dyn WorkspaceClient>,
    ai: Arc<dyn AiClient>,
    settings: HandlerSettings,
}

impl SummarizeHandler {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        ai: Arc<dyn AiClient>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            workspace,
            ai,
            settings,
        }
    }
}

#[async_trait]
impl CommandHandler for SummarizeHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Summarize
    }

    async fn handle(
        &self,
        document: &Document,
        command: &Command,
        _ctx: &HandlerContext,
    ) -> Result<Outcome, Error> {
        if !self.settings.add_summaries {
            return Ok(Outcome::Skipped);
        }

        let summary = self
            .ai
            .generate_summary(&document.title, &document.text)
            .await?;
        let body = format!("> **Summary**: {}", summary.trim());

        // One update: refresh the summary block and drop the marker line.
        let fresh = self.workspace.get_document(&document.id).await?;
        let without_marker = remove_marker_line(&fresh.text, &command.raw);
        let applied = apply_section(
            &without_marker,
            Section::Summary,
            &body,
            self.settings.respect_user_ownership,
        );
        if applied.text != fresh.text {
            self.workspace
                .update_document(
                    &document.id,
                    DocumentPatch {
                        text: Some(applied.text),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(Outcome::MarkerRemoved)
    }
}

pub struct EnhanceTitleHandler {
    workspace: Arc<dyn WorkspaceClient>,
    ai: Arc<dyn AiClient>,
    settings: HandlerSettings,
}

impl EnhanceTitleHandler {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        ai: Arc<dyn AiClient>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            workspace,
            ai,
            settings,
        }
    }
}

#[async_trait]
impl CommandHandler for EnhanceTitleHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::EnhanceTitle
    }

    async fn handle(
        &self,
        document: &Document,
        _command: &Command,
        _ctx: &HandlerContext,
    ) -> Result<Outcome, Error> {
        if !self.settings.enhance_titles {
            return Ok(Outcome::Skipped);
        }
        if !is_vague_title(&document.title) {
            tracing::debug!(document = %document.id, "title not vague, keeping it");
            return Ok(Outcome::Done);
        }

        let suggestion = self
            .ai
            .enhance_title(&document.title, &document.text)
            .await?;
        if suggestion.confidence < TITLE_CONFIDENCE_GATE || suggestion.title.trim().is_empty() {
            tracing::debug!(
                document = %document.id,
                confidence = suggestion.confidence,
                "title suggestion below gate, keeping current title"
            );
            return Ok(Outcome::Done);
        }

        self.workspace
            .update_document(
                &document.id,
                DocumentPatch {
                    title: Some(suggestion.title.trim().to_string()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vague_titles_match_rule() {
        assert!(is_vague_title("Untitled"));
        assert!(is_vague_title("draft"));
        assert!(is_vague_title("abc"));
        assert!(is_vague_title("12345 678"));
        assert!(is_vague_title("  temp  "));
    }

    #[test]
    fn descriptive_titles_kept() {
        assert!(!is_vague_title("PostgreSQL Connection Pooling"));
        assert!(!is_vague_title("Q3 planning notes"));
    }
}
