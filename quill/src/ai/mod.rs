//! AI client: chat-completion provider behind a capability trait, returning
//! strictly-typed JSON for every operation the handlers depend on.

mod breaker;
mod http;
mod mock;

pub use breaker::CircuitBreaker;
pub use http::HttpAiClient;
pub use mock::MockAi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::taxonomy::TaxonomyEntry;

/// Classification result for filing a document into a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub collection_id: String,
    /// In `[0, 1]`; compared against the configured threshold.
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub search_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub collection_id: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Answer to a `/ai` question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Markdown body.
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_title: String,
    #[serde(default)]
    pub document_url: String,
}

/// Title rewrite suggestion; applied only above the confidence gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleSuggestion {
    pub title: String,
    #[serde(default)]
    pub confidence: f64,
}

/// One related document, with the reason it is related.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedDoc {
    pub title: String,
    #[serde(default)]
    pub document_url: String,
    #[serde(default)]
    pub reason: String,
}

/// A search hit prepared as question-answering context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextDocument {
    pub title: String,
    /// Truncated to 500 chars by the handler.
    pub excerpt: String,
    pub url: String,
}

/// Chat-completion operations. Implementations are rate-limited and guarded by
/// a circuit breaker; all responses are validated against these schemas before
/// they reach a handler.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn classify_document(
        &self,
        title: &str,
        text: &str,
        user_guidance: Option<&str>,
        taxonomy: &[TaxonomyEntry],
    ) -> Result<Classification, Error>;

    async fn answer_question(
        &self,
        question: &str,
        context: &[ContextDocument],
    ) -> Result<Answer, Error>;

    async fn generate_summary(&self, title: &str, text: &str) -> Result<String, Error>;

    async fn enhance_title(&self, title: &str, text: &str) -> Result<TitleSuggestion, Error>;

    async fn generate_search_terms(&self, title: &str, text: &str)
        -> Result<Vec<String>, Error>;

    async fn find_related_documents(
        &self,
        title: &str,
        text: &str,
        candidates: &[crate::outline::SearchHit],
    ) -> Result<Vec<RelatedDoc>, Error>;

    /// Cheap liveness probe for /ready.
    async fn ping(&self) -> Result<(), Error>;
}
