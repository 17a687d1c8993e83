//! Chat-completions implementation of [`AiClient`].
//!
//! Every operation sends one OpenAI-style request whose system prompt pins the
//! JSON shape, then parses the reply strictly into the typed schema. Transport
//! failures feed the circuit breaker; schema violations become
//! [`Error::InvalidAiResponse`] (transient for one retry at the worker level).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{
    Answer, AiClient, CircuitBreaker, Classification, ContextDocument, RelatedDoc,
    TitleSuggestion,
};
use crate::error::Error;
use crate::outline::SearchHit;
use crate::ratelimit::TokenBucket;
use crate::taxonomy::TaxonomyEntry;

/// Upper bound on document text shipped per request, in chars. Crude but
/// sufficient: the interesting structure lives at the start of wiki pages.
const MAX_PROMPT_TEXT: usize = 12_000;

#[derive(Clone)]
pub struct HttpAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    limiter: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl HttpAiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
        max_tokens: u32,
        rate_limit_per_minute: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            limiter: Arc::new(TokenBucket::per_minute(rate_limit_per_minute)),
            breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    async fn complete<T: DeserializeOwned>(
        &self,
        system: &str,
        user: String,
    ) -> Result<T, Error> {
        self.breaker.check()?;
        self.limiter.acquire().await?;

        let url = format!(
            "{}/chat/completions",
            self.endpoint.trim_end_matches('/')
        );
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let result = self.send(&url, &body).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.is_transient() => self.breaker.record_failure(),
            Err(_) => {}
        }
        let content = result?;

        let payload = extract_json(&content);
        serde_json::from_str(payload)
            .map_err(|e| Error::InvalidAiResponse(format!("{e}; content: {content:.200}")))
    }

    async fn send(&self, url: &str, body: &serde_json::Value) -> Result<String, Error> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Transient(format!("AI timeout: {e}"))
                } else {
                    Error::Transient(format!("AI request: {e}"))
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::Auth(format!("AI {status}: {detail}")),
                429 => Error::Transient(format!("AI rate limited: {detail}")),
                s if s >= 500 => Error::Transient(format!("AI {status}: {detail}")),
                _ => Error::InvalidAiResponse(format!("AI {status}: {detail}")),
            });
        }
        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("decode AI response: {e}")))?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::InvalidAiResponse("empty choices".to_string()))
    }
}

/// Pulls the JSON object out of a completion that may be fenced or surrounded
/// by prose.
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
    {
        return inner.trim();
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Deserialize)]
struct SummaryReply {
    summary: String,
}

#[derive(Deserialize)]
struct SearchTermsReply {
    search_terms: Vec<String>,
}

#[derive(Deserialize)]
struct RelatedReply {
    related: Vec<RelatedDoc>,
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn classify_document(
        &self,
        title: &str,
        text: &str,
        user_guidance: Option<&str>,
        taxonomy: &[TaxonomyEntry],
    ) -> Result<Classification, Error> {
        let system = "You file wiki documents into collections. Reply with JSON only: \
            {\"collection_id\": string, \"confidence\": number 0..1, \"reasoning\": string, \
            \"alternatives\": [{\"collection_id\": string, \"confidence\": number, \
            \"reasoning\": string}], \"search_terms\": [string]}";
        let user = json!({
            "title": title,
            "text": clip(text, MAX_PROMPT_TEXT),
            "user_guidance": user_guidance,
            "taxonomy": taxonomy,
        })
        .to_string();
        self.complete(system, user).await
    }

    async fn answer_question(
        &self,
        question: &str,
        context: &[ContextDocument],
    ) -> Result<Answer, Error> {
        let system = "You answer questions from the provided wiki context. Reply with JSON \
            only: {\"answer\": markdown string, \"citations\": [{\"document_title\": string, \
            \"document_url\": string}], \"confidence\": number 0..1}";
        let user = json!({"question": question, "context": context}).to_string();
        self.complete(system, user).await
    }

    async fn generate_summary(&self, title: &str, text: &str) -> Result<String, Error> {
        let system = "You summarize wiki documents in 2-3 sentences. Reply with JSON only: \
            {\"summary\": string}";
        let user = json!({"title": title, "text": clip(text, MAX_PROMPT_TEXT)}).to_string();
        let reply: SummaryReply = self.complete(system, user).await?;
        Ok(reply.summary)
    }

    async fn enhance_title(&self, title: &str, text: &str) -> Result<TitleSuggestion, Error> {
        let system = "You rewrite vague wiki document titles. Reply with JSON only: \
            {\"title\": string, \"confidence\": number 0..1}";
        let user = json!({"title": title, "text": clip(text, MAX_PROMPT_TEXT)}).to_string();
        self.complete(system, user).await
    }

    async fn generate_search_terms(
        &self,
        title: &str,
        text: &str,
    ) -> Result<Vec<String>, Error> {
        let system = "You extract 3-8 search terms from a wiki document. Reply with JSON \
            only: {\"search_terms\": [string]}";
        let user = json!({"title": title, "text": clip(text, MAX_PROMPT_TEXT)}).to_string();
        let reply: SearchTermsReply = self.complete(system, user).await?;
        Ok(reply.search_terms)
    }

    async fn find_related_documents(
        &self,
        title: &str,
        text: &str,
        candidates: &[SearchHit],
    ) -> Result<Vec<RelatedDoc>, Error> {
        let system = "You pick documents related to the given one from the candidate list. \
            Reply with JSON only: {\"related\": [{\"title\": string, \"document_url\": string, \
            \"reason\": string}]}";
        let user = json!({
            "title": title,
            "text": clip(text, MAX_PROMPT_TEXT),
            "candidates": candidates,
        })
        .to_string();
        let reply: RelatedReply = self.complete(system, user).await?;
        Ok(reply.related)
    }

    async fn ping(&self) -> Result<(), Error> {
        self.breaker.check()
    }
}
