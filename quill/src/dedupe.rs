//! Question dedup: canonical hash over (document, normalized question), backed
//! by the `question_state` table.
//!
//! The hash here is the single source of truth; the Q&A handler and the
//! persistence layer both go through it.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::Error;
use quill_store::{QuestionState, Store};

/// Lowercase, collapse internal whitespace, trim, strip trailing `?.,!;:`.
pub fn normalize(question: &str) -> String {
    let lowered = question.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['?', '.', ',', '!', ';', ':'])
        .trim()
        .to_string()
}

/// `hex(SHA-256(document_id + ":" + normalize(question)))`.
pub fn question_hash(document_id: &str, question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalize(question).as_bytes());
    hex::encode(hasher.finalize())
}

/// Store-backed dedup checks for the Q&A handler.
pub struct Deduper {
    store: Arc<Store>,
}

impl Deduper {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn hash(&self, document_id: &str, question: &str) -> String {
        question_hash(document_id, question)
    }

    pub async fn already_answered(&self, hash: &str) -> Result<bool, Error> {
        Ok(self
            .store
            .get_question(hash)
            .await?
            .map(|q| q.answered)
            .unwrap_or(false))
    }

    pub async fn mark_answered(
        &self,
        hash: &str,
        document_id: &str,
        question: &str,
        comment_id: Option<String>,
    ) -> Result<(), Error> {
        self.store
            .upsert_question(&QuestionState {
                question_hash: hash.to_string(),
                document_id: document_id.to_string(),
                normalized_question: normalize(question),
                processed_at_ms: chrono::Utc::now().timestamp_millis(),
                answered: true,
                comment_id,
                last_error: None,
                retry_count: 0,
            })
            .await?;
        Ok(())
    }
}
