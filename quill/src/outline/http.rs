//! HTTP implementation of [`WorkspaceClient`] against the wiki's RPC-style API
//! (`POST {endpoint}/api/{method}` with a JSON body, `{"data": ...}` responses).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{Collection, Comment, Document, DocumentPatch, SearchHit, WorkspaceClient};
use crate::error::Error;
use crate::ratelimit::TokenBucket;

const CLIENT_RETRIES: u32 = 3;
const CLIENT_BACKOFF: Duration = Duration::from_secs(1);

/// Rate-limited, retrying client. Clones share the limiter.
#[derive(Clone)]
pub struct HttpWorkspaceClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    limiter: Arc<TokenBucket>,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    id: String,
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    collection_id: Option<String>,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    url: Option<String>,
}

impl From<WireDocument> for Document {
    fn from(w: WireDocument) -> Self {
        Document {
            id: w.id,
            title: w.title,
            text: w.text,
            collection_id: w.collection_id,
            updated_at: w.updated_at,
            url: w.url,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCollection {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<WireCollection> for Collection {
    fn from(w: WireCollection) -> Self {
        Collection {
            id: w.id,
            name: w.name,
            description: w.description.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct WireSearchHit {
    #[serde(default)]
    context: Option<String>,
    document: WireDocument,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    id: String,
    document_id: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl HttpWorkspaceClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        rate_limit_per_minute: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            limiter: Arc::new(TokenBucket::per_minute(rate_limit_per_minute)),
        }
    }

    /// One RPC call with rate limiting and bounded retries on transient
    /// failures. Permanent statuses fail immediately.
    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, Error> {
        let url = format!("{}/api/{}", self.endpoint.trim_end_matches('/'), method);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await?;
            let result = self.call_once(&url, &body).await;
            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < CLIENT_RETRIES => {
                    tracing::debug!(method, attempt, error = %e, "workspace call retrying");
                    tokio::time::sleep(CLIENT_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, Error> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| Error::Transient(format!("decode workspace response: {e}")));
        }
        let detail = response.text().await.unwrap_or_default();
        Err(classify_status(status, &detail))
    }
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transient(format!("workspace timeout: {e}"))
    } else {
        Error::Transient(format!("workspace request: {e}"))
    }
}

fn classify_status(status: reqwest::StatusCode, detail: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::Auth(format!("workspace {status}: {detail}")),
        404 => Error::NotFound(format!("workspace {status}: {detail}")),
        400 => Error::Validation(format!("workspace {status}: {detail}")),
        429 => Error::Transient(format!("workspace rate limited: {detail}")),
        s if s >= 500 => Error::Transient(format!("workspace {status}: {detail}")),
        _ => Error::Validation(format!("workspace {status}: {detail}")),
    }
}

#[async_trait]
impl WorkspaceClient for HttpWorkspaceClient {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        let wire: DataEnvelope<Vec<WireCollection>> =
            self.rpc("collections.list", json!({"limit": 100})).await?;
        Ok(wire.data.into_iter().map(Into::into).collect())
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, Error> {
        let wire: DataEnvelope<WireCollection> =
            self.rpc("collections.info", json!({"id": id})).await?;
        Ok(wire.data.into())
    }

    async fn get_document(&self, id: &str) -> Result<Document, Error> {
        let wire: DataEnvelope<WireDocument> =
            self.rpc("documents.info", json!({"id": id})).await?;
        Ok(wire.data.into())
    }

    async fn list_documents(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<Document>, Error> {
        let wire: DataEnvelope<Vec<WireDocument>> = self
            .rpc(
                "documents.list",
                json!({"collectionId": collection_id, "limit": limit}),
            )
            .await?;
        Ok(wire.data.into_iter().map(Into::into).collect())
    }

    async fn update_document(&self, id: &str, patch: DocumentPatch) -> Result<Document, Error> {
        let mut body = json!({"id": id});
        if let Some(title) = &patch.title {
            body["title"] = json!(title);
        }
        if let Some(text) = &patch.text {
            body["text"] = json!(text);
        }
        let wire: DataEnvelope<WireDocument> = self.rpc("documents.update", body).await?;
        Ok(wire.data.into())
    }

    async fn move_document(&self, id: &str, collection_id: &str) -> Result<(), Error> {
        let _: serde_json::Value = self
            .rpc(
                "documents.move",
                json!({"id": id, "collectionId": collection_id}),
            )
            .await?;
        Ok(())
    }

    async fn search_documents(
        &self,
        query: &str,
        limit: usize,
        collection_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, Error> {
        let mut body = json!({"query": query, "limit": limit});
        if let Some(cid) = collection_id {
            body["collectionId"] = json!(cid);
        }
        let wire: DataEnvelope<Vec<WireSearchHit>> = self.rpc("documents.search", body).await?;
        Ok(wire
            .data
            .into_iter()
            .map(|hit| SearchHit {
                document_id: hit.document.id,
                title: hit.document.title,
                context: hit.context.unwrap_or_default(),
                url: hit.document.url,
            })
            .collect())
    }

    async fn create_comment(&self, document_id: &str, body: &str) -> Result<Comment, Error> {
        let wire: DataEnvelope<WireComment> = self
            .rpc(
                "comments.create",
                json!({"documentId": document_id, "data": {"text": body}}),
            )
            .await?;
        Ok(Comment {
            id: wire.data.id,
            document_id: wire.data.document_id,
            body: wire.data.data["text"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn list_comments(&self, document_id: &str) -> Result<Vec<Comment>, Error> {
        let wire: DataEnvelope<Vec<WireComment>> = self
            .rpc("comments.list", json!({"documentId": document_id}))
            .await?;
        Ok(wire
            .data
            .into_iter()
            .map(|c| Comment {
                id: c.id,
                document_id: c.document_id,
                body: c.data["text"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), Error> {
        let _: serde_json::Value = self.rpc("auth.info", json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_policy() {
        assert!(classify_status(reqwest::StatusCode::UNAUTHORIZED, "").is_permanent());
        assert!(classify_status(reqwest::StatusCode::FORBIDDEN, "").is_permanent());
        assert!(classify_status(reqwest::StatusCode::NOT_FOUND, "").is_permanent());
        assert!(classify_status(reqwest::StatusCode::BAD_REQUEST, "").is_permanent());
        assert!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(reqwest::StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "").is_transient()
        );
    }
}
