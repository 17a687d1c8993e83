//! `/ai-file`: classify the document against the taxonomy and either file it
//! (high confidence, checkpointed steps) or convert the marker to `?ai-file`
//! and ask the user for guidance (low confidence).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CommandHandler, HandlerContext, HandlerSettings, Outcome};
use crate::ai::AiClient;
use crate::command::{convert_file_to_pending, remove_filing_markers, Command, CommandKind};
use crate::comments;
use crate::editor::{apply_section, Section};
use crate::error::Error;
use crate::outline::{Document, DocumentPatch, WorkspaceClient};
use crate::taxonomy::{TaxonomyCache, TaxonomyEntry};
use quill_store::Store;

/// Step flags for the high-confidence filing path. Monotonic: a flag set true
/// means the side-effect was observed to succeed; flags never go back to false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingCheckpoint {
    pub document_moved: bool,
    pub search_terms_added: bool,
    pub markers_removed: bool,
    pub comment_posted: bool,
}

impl FilingCheckpoint {
    pub async fn load(store: &Store, task_id: &str) -> Result<Self, Error> {
        Ok(store
            .get_checkpoint(task_id)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    pub async fn save(&self, store: &Store, task_id: &str) -> Result<(), Error> {
        let value = serde_json::to_value(self).map_err(|e| Error::Storage(e.to_string()))?;
        store.put_checkpoint(task_id, &value).await?;
        Ok(())
    }
}

pub struct FileHandler {
    workspace: Arc<dyn WorkspaceClient>,
    ai: Arc<dyn AiClient>,
    taxonomy: Arc<TaxonomyCache>,
    store: Arc<Store>,
    settings: HandlerSettings,
}

impl FileHandler {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        ai: Arc<dyn AiClient>,
        taxonomy: Arc<TaxonomyCache>,
        store: Arc<Store>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            workspace,
            ai,
            taxonomy,
            store,
            settings,
        }
    }

    async fn file_with_checkpoints(
        &self,
        document: &Document,
        taxonomy: &[TaxonomyEntry],
        classification: &crate::ai::Classification,
        task_id: &str,
    ) -> Result<Outcome, Error> {
        let mut checkpoint = FilingCheckpoint::load(&self.store, task_id).await?;

        if !checkpoint.document_moved {
            self.workspace
                .move_document(&document.id, &classification.collection_id)
                .await?;
            checkpoint.document_moved = true;
            checkpoint.save(&self.store, task_id).await?;
        }

        if !checkpoint.search_terms_added {
            if !classification.search_terms.is_empty() {
                let fresh = self.workspace.get_document(&document.id).await?;
                let body = format!(
                    "**Search terms**: {}",
                    classification.search_terms.join(", ")
                );
                let applied = apply_section(
                    &fresh.text,
                    Section::SearchTerms,
                    &body,
                    self.settings.respect_user_ownership,
                );
                if applied.changed {
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
            }
            checkpoint.search_terms_added = true;
            checkpoint.save(&self.store, task_id).await?;
        }

        if !checkpoint.markers_removed {
            let fresh = self.workspace.get_document(&document.id).await?;
            let cleaned = remove_filing_markers(&fresh.text);
            if cleaned != fresh.text {
                self.workspace
                    .update_document(
                        &document.id,
                        DocumentPatch {
                            text: Some(cleaned),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            checkpoint.markers_removed = true;
            checkpoint.save(&self.store, task_id).await?;
        }

        if !checkpoint.comment_posted {
            let name = collection_name(taxonomy, &classification.collection_id);
            let body = comments::filing_success(
                &name,
                classification.confidence,
                &classification.reasoning,
            );
            // Comment posting is non-fatal: the filing already happened.
            match self.workspace.create_comment(&document.id, &body).await {
                Ok(_) => {
                    checkpoint.comment_posted = true;
                    checkpoint.save(&self.store, task_id).await?;
                }
                Err(e) => {
                    tracing::warn!(document = %document.id, error = %e, "success comment failed");
                }
            }
        }

        Ok(Outcome::MarkerRemoved)
    }

    async fn convert_to_pending(
        &self,
        document: &Document,
        command: &Command,
        taxonomy: &[TaxonomyEntry],
        classification: &crate::ai::Classification,
    ) -> Result<Outcome, Error> {
        let fresh = self.workspace.get_document(&document.id).await?;
        let converted = convert_file_to_pending(&fresh.text, &command.raw);
        if converted != fresh.text {
            self.workspace
                .update_document(
                    &document.id,
                    DocumentPatch {
                        text: Some(converted),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let alternatives: Vec<comments::AlternativeLine> = classification
            .alternatives
            .iter()
            .map(|alt| comments::AlternativeLine {
                name: collection_name(taxonomy, &alt.collection_id),
                confidence: alt.confidence,
                reasoning: alt.reasoning.clone(),
            })
            .collect();
        let body = comments::filing_uncertain(
            &collection_name(taxonomy, &classification.collection_id),
            classification.confidence,
            &alternatives,
            self.settings.max_alternatives,
        );
        if let Err(e) = self.workspace.create_comment(&document.id, &body).await {
            tracing::warn!(document = %document.id, error = %e, "uncertainty comment failed");
        }

        Ok(Outcome::ConvertedToPending)
    }
}

fn collection_name(taxonomy: &[TaxonomyEntry], collection_id: &str) -> String {
    taxonomy
        .iter()
        .find(|e| e.collection_id == collection_id)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| collection_id.to_string())
}

#[async_trait]
impl CommandHandler for FileHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::File
    }

    async fn handle(
        &self,
        document: &Document,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<Outcome, Error> {
        let taxonomy = self.taxonomy.get().await?;
        let guidance = if command.args.is_empty() {
            None
        } else {
            Some(command.args.as_str())
        };

        let classification = self
            .ai
            .classify_document(&document.title, &document.text, guidance, &taxonomy)
            .await?;

        if !TaxonomyCache::contains(&taxonomy, &classification.collection_id) {
            return Err(Error::InvalidAiResponse(format!(
                "collection {} not in taxonomy",
                classification.collection_id
            )));
        }

        tracing::info!(
            document = %document.id,
            collection = %classification.collection_id,
            confidence = classification.confidence,
            guided = guidance.is_some(),
            "classification result"
        );

        if classification.confidence >= self.settings.confidence_threshold {
            self.file_with_checkpoints(document, &taxonomy, &classification, &ctx.task_id)
                .await
        } else {
            self.convert_to_pending(document, command, &taxonomy, &classification)
                .await
        }
    }
}
