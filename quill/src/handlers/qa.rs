//! `/ai <question>`: answer from workspace context, post as a comment, and
//! remember the question hash so duplicate webhooks never re-answer.

use std::sync::Arc;

use async_trait::async_trait;

use super::{AnswerMethod, CommandHandler, HandlerContext, HandlerSettings, Outcome};
use crate::ai::{AiClient, Answer, ContextDocument};
use crate::command::{replace_marker_line, Command, CommandKind};
use crate::comments;
use crate::dedupe::Deduper;
use crate::error::Error;
use crate::outline::{Document, DocumentPatch, WorkspaceClient};

/// Max chars of a search hit shipped as answer context.
const EXCERPT_CHARS: usize = 500;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "when", "where", "which", "who", "why",
    "how", "does", "did", "can", "could", "should", "would", "our", "your", "their", "this",
    "that", "with", "from", "have", "has", "had", "not", "but", "about", "into", "than", "then",
];

/// Lowercase, split on whitespace, strip `?.,!;:`, drop stop-words and tokens
/// shorter than 3 chars. Falls back to the raw text when nothing survives.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let keywords: Vec<String> = question
        .to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(['?', '.', ',', '!', ';', ':']).to_string())
        .filter(|token| token.len() >= 3 && !STOP_WORDS.contains(&token.as_str()))
        .collect();
    if keywords.is_empty() {
        vec![question.trim().to_string()]
    } else {
        keywords
    }
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub struct QaHandler {
    workspace: Arc<dyn WorkspaceClient>,
    ai: Arc<dyn AiClient>,
    deduper: Deduper,
    settings: HandlerSettings,
}

impl QaHandler {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        ai: Arc<dyn AiClient>,
        deduper: Deduper,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            workspace,
            ai,
            deduper,
            settings,
        }
    }
}

#[async_trait]
impl CommandHandler for QaHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Ask
    }

    async fn handle(
        &self,
        document: &Document,
        command: &Command,
        _ctx: &HandlerContext,
    ) -> Result<Outcome, Error> {
        let question = &command.args;
        let hash = self.deduper.hash(&document.id, question);
        if self.deduper.already_answered(&hash).await? {
            tracing::debug!(document = %document.id, "question already answered, skipping");
            return Ok(Outcome::Skipped);
        }

        let keywords = extract_keywords(question);
        let hits = self
            .workspace
            .search_documents(
                &keywords.join(" "),
                self.settings.max_context_documents,
                None,
            )
            .await?;
        let context: Vec<ContextDocument> = hits
            .iter()
            .map(|hit| ContextDocument {
                title: hit.title.clone(),
                excerpt: excerpt(&hit.context),
                url: hit.url.clone().unwrap_or_default(),
            })
            .collect();

        let answer = self.ai.answer_question(question, &context).await?;

        match self.settings.answer_method {
            AnswerMethod::Comment => {
                let comment = self
                    .workspace
                    .create_comment(&document.id, &comments::answer(&answer))
                    .await?;
                self.deduper
                    .mark_answered(&hash, &document.id, question, Some(comment.id))
                    .await?;
                Ok(Outcome::Done)
            }
            AnswerMethod::Inline => {
                let fresh = self.workspace.get_document(&document.id).await?;
                let block = inline_answer(question, &answer);
                let rewritten = replace_marker_line(&fresh.text, &command.raw, &block);
                if rewritten != fresh.text {
                    self.workspace
                        .update_document(
                            &document.id,
                            DocumentPatch {
                                text: Some(rewritten),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                self.deduper
                    .mark_answered(&hash, &document.id, question, None)
                    .await?;
                Ok(Outcome::MarkerRemoved)
            }
        }
    }
}

/// Quote block that replaces the `/ai` marker line when answers are inline.
fn inline_answer(question: &str, answer: &Answer) -> String {
    let body = comments::answer(answer).replace('\n', "\n> ");
    format!("> **Q**: {question}\n>\n> {body}")
}
