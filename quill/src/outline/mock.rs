//! Mock workspace for tests: in-memory documents, collections, and comments,
//! with call counters and per-method failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Collection, Comment, Document, DocumentPatch, SearchHit, WorkspaceClient};
use crate::error::Error;

/// In-memory [`WorkspaceClient`]. Interior mutability throughout so tests can
/// share it as `Arc<MockWorkspace>` with the code under test.
#[derive(Default)]
pub struct MockWorkspace {
    documents: Mutex<HashMap<String, Document>>,
    collections: Mutex<Vec<Collection>>,
    comments: Mutex<Vec<Comment>>,
    search_results: Mutex<Vec<SearchHit>>,
    next_comment_id: AtomicU64,
    /// Errors to return, keyed by method name, consumed in order.
    failures: Mutex<HashMap<&'static str, VecDeque<Error>>>,
    pub list_collections_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub move_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl MockWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, doc: Document) {
        self.documents.lock().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn insert_collection(&self, collection: Collection) {
        self.collections.lock().unwrap().push(collection);
    }

    /// Fixed results returned by every `search_documents` call.
    pub fn set_search_results(&self, hits: Vec<SearchHit>) {
        *self.search_results.lock().unwrap() = hits;
    }

    /// Queue an error for the next call to `method`.
    pub fn fail_next(&self, method: &'static str, error: Error) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(error);
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn comments_for(&self, document_id: &str) -> Vec<Comment> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect()
    }

    fn take_failure(&self, method: &'static str) -> Option<Error> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl WorkspaceClient for MockWorkspace {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        self.list_collections_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("list_collections") {
            return Err(e);
        }
        Ok(self.collections.lock().unwrap().clone())
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, Error> {
        self.collections
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection {id}")))
    }

    async fn get_document(&self, id: &str) -> Result<Document, Error> {
        if let Some(e) = self.take_failure("get_document") {
            return Err(e);
        }
        self.document(id)
            .ok_or_else(|| Error::NotFound(format!("document {id}")))
    }

    async fn list_documents(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<Document>, Error> {
        let docs = self.documents.lock().unwrap();
        Ok(docs
            .values()
            .filter(|d| d.collection_id.as_deref() == Some(collection_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_document(&self, id: &str, patch: DocumentPatch) -> Result<Document, Error> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("update_document") {
            return Err(e);
        }
        let mut docs = self.documents.lock().unwrap();
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        if let Some(title) = patch.title {
            doc.title = title;
        }
        if let Some(text) = patch.text {
            doc.text = text;
        }
        doc.updated_at = Some(chrono::Utc::now());
        Ok(doc.clone())
    }

    async fn move_document(&self, id: &str, collection_id: &str) -> Result<(), Error> {
        self.move_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("move_document") {
            return Err(e);
        }
        let mut docs = self.documents.lock().unwrap();
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        doc.collection_id = Some(collection_id.to_string());
        Ok(())
    }

    async fn search_documents(
        &self,
        _query: &str,
        limit: usize,
        _collection_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, Error> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("search_documents") {
            return Err(e);
        }
        Ok(self
            .search_results
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, document_id: &str, body: &str) -> Result<Comment, Error> {
        if let Some(e) = self.take_failure("create_comment") {
            return Err(e);
        }
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let comment = Comment {
            id: format!("comment-{id}"),
            document_id: document_id.to_string(),
            body: body.to_string(),
        };
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, document_id: &str) -> Result<Vec<Comment>, Error> {
        Ok(self.comments_for(document_id))
    }

    async fn ping(&self) -> Result<(), Error> {
        if let Some(e) = self.take_failure("ping") {
            return Err(e);
        }
        Ok(())
    }
}
