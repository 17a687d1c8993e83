//! `/related`: find related documents and post them as a comment. Read-only
//! apart from the comment; no markers involved.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CommandHandler, HandlerContext, Outcome};
use crate::ai::AiClient;
use crate::command::{Command, CommandKind};
use crate::comments;
use crate::error::Error;
use crate::outline::{Document, SearchHit, WorkspaceClient};

/// Candidate pool handed to the AI for ranking.
const CANDIDATE_LIMIT: usize = 10;

pub struct RelatedHandler {
    workspace: Arc<dyn WorkspaceClient>,
    ai: Arc<dyn AiClient>,
}

impl RelatedHandler {
    pub fn new(workspace: Arc<dyn WorkspaceClient>, ai: Arc<dyn AiClient>) -> Self {
        Self { workspace, ai }
    }
}

#[async_trait]
impl CommandHandler for RelatedHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Related
    }

    async fn handle(
        &self,
        document: &Document,
        _command: &Command,
        _ctx: &HandlerContext,
    ) -> Result<Outcome, Error> {
        let candidates: Vec<SearchHit> = self
            .workspace
            .search_documents(&document.title, CANDIDATE_LIMIT, None)
            .await?
            .into_iter()
            .filter(|hit| hit.document_id != document.id)
            .collect();

        let related = self
            .ai
            .find_related_documents(&document.title, &document.text, &candidates)
            .await?;

        self.workspace
            .create_comment(&document.id, &comments::related(&related))
            .await?;

        Ok(Outcome::Done)
    }
}
