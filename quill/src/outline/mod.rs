//! Workspace client: the wiki's HTTP API as a capability trait.
//!
//! The core depends only on [`WorkspaceClient`]; the HTTP implementation
//! ([`HttpWorkspaceClient`]) carries the rate limiter and retry classification,
//! and [`MockWorkspace`] backs tests.

mod http;
mod mock;

pub use http::HttpWorkspaceClient;
pub use mock::MockWorkspace;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A workspace document. Owned externally; read and written only through the
/// client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A named document container.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One search result: document identity plus a context snippet.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchHit {
    pub document_id: String,
    pub title: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Partial document update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A posted comment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Comment {
    pub id: String,
    pub document_id: String,
    pub body: String,
}

/// Operations the core needs from the wiki. Implementations are expected to be
/// rate-limited and to classify upstream failures into the [`Error`] taxonomy
/// (401/403/404/400 permanent, 429/5xx transient).
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error>;
    async fn get_collection(&self, id: &str) -> Result<Collection, Error>;
    async fn get_document(&self, id: &str) -> Result<Document, Error>;
    /// Documents in a collection, bounded by `limit`.
    async fn list_documents(&self, collection_id: &str, limit: usize)
        -> Result<Vec<Document>, Error>;
    async fn update_document(&self, id: &str, patch: DocumentPatch) -> Result<Document, Error>;
    async fn move_document(&self, id: &str, collection_id: &str) -> Result<(), Error>;
    async fn search_documents(
        &self,
        query: &str,
        limit: usize,
        collection_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, Error>;
    async fn create_comment(&self, document_id: &str, body: &str) -> Result<Comment, Error>;
    async fn list_comments(&self, document_id: &str) -> Result<Vec<Comment>, Error>;
    /// Cheap liveness probe for /ready.
    async fn ping(&self) -> Result<(), Error>;
}
