//! Mock AI client for tests: queued classifications, fixed replies, call
//! counters, and per-method failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    Answer, AiClient, Classification, ContextDocument, RelatedDoc, TitleSuggestion,
};
use crate::error::Error;
use crate::outline::SearchHit;
use crate::taxonomy::TaxonomyEntry;

/// In-memory [`AiClient`]. Classifications are consumed from a queue so a test
/// can script "low confidence first, high confidence on the retry"; other
/// operations return fixed values.
#[derive(Default)]
pub struct MockAi {
    classifications: Mutex<VecDeque<Classification>>,
    answer: Mutex<Option<Answer>>,
    summary: Mutex<String>,
    title: Mutex<Option<TitleSuggestion>>,
    search_terms: Mutex<Vec<String>>,
    related: Mutex<Vec<RelatedDoc>>,
    failures: Mutex<HashMap<&'static str, VecDeque<Error>>>,
    pub classify_calls: AtomicUsize,
    pub answer_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
}

impl MockAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a classification; each `classify_document` call consumes one.
    pub fn push_classification(&self, c: Classification) {
        self.classifications.lock().unwrap().push_back(c);
    }

    pub fn set_answer(&self, a: Answer) {
        *self.answer.lock().unwrap() = Some(a);
    }

    pub fn set_summary(&self, s: impl Into<String>) {
        *self.summary.lock().unwrap() = s.into();
    }

    pub fn set_title(&self, t: TitleSuggestion) {
        *self.title.lock().unwrap() = Some(t);
    }

    pub fn set_search_terms(&self, terms: Vec<String>) {
        *self.search_terms.lock().unwrap() = terms;
    }

    pub fn set_related(&self, related: Vec<RelatedDoc>) {
        *self.related.lock().unwrap() = related;
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

    fn take_failure(&self, method: &'static str) -> Option<Error> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl AiClient for MockAi {
    async fn classify_document(
        &self,
        _title: &str,
        _text: &str,
        _user_guidance: Option<&str>,
        _taxonomy: &[TaxonomyEntry],
    ) -> Result<Classification, Error> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("classify_document") {
            return Err(e);
        }
        self.classifications
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::InvalidAiResponse("mock: no classification queued".into()))
    }

    async fn answer_question(
        &self,
        _question: &str,
        _context: &[ContextDocument],
    ) -> Result<Answer, Error> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("answer_question") {
            return Err(e);
        }
        self.answer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::InvalidAiResponse("mock: no answer configured".into()))
    }

    async fn generate_summary(&self, _title: &str, _text: &str) -> Result<String, Error> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure("generate_summary") {
            return Err(e);
        }
        Ok(self.summary.lock().unwrap().clone())
    }

    async fn enhance_title(&self, _title: &str, _text: &str) -> Result<TitleSuggestion, Error> {
        if let Some(e) = self.take_failure("enhance_title") {
            return Err(e);
        }
        self.title
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::InvalidAiResponse("mock: no title configured".into()))
    }

    async fn generate_search_terms(
        &self,
        _title: &str,
        _text: &str,
    ) -> Result<Vec<String>, Error> {
        Ok(self.search_terms.lock().unwrap().clone())
    }

    async fn find_related_documents(
        &self,
        _title: &str,
        _text: &str,
        _candidates: &[SearchHit],
    ) -> Result<Vec<RelatedDoc>, Error> {
        if let Some(e) = self.take_failure("find_related_documents") {
            return Err(e);
        }
        Ok(self.related.lock().unwrap().clone())
    }

    async fn ping(&self) -> Result<(), Error> {
        if let Some(e) = self.take_failure("ping") {
            return Err(e);
        }
        Ok(())
    }
}
