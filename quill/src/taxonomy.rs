//! Read-mostly taxonomy cache: collections plus a bounded sample of document
//! titles per collection, handed to AI classification requests.
//!
//! Rebuilds are guarded by double-checked locking: many concurrent readers on
//! a warm cache, exactly one rebuild on a cold or expired one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::Error;
use crate::outline::WorkspaceClient;

/// One collection as the classifier sees it.
#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyEntry {
    pub collection_id: String,
    pub name: String,
    pub description: String,
    pub sample_titles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TaxonomyOptions {
    pub cache_ttl: Duration,
    pub include_sample_documents: bool,
    pub max_samples_per_collection: usize,
}

impl Default for TaxonomyOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            include_sample_documents: true,
            max_samples_per_collection: 5,
        }
    }
}

struct CachedTaxonomy {
    entries: Arc<Vec<TaxonomyEntry>>,
    built_at: Instant,
}

pub struct TaxonomyCache {
    workspace: Arc<dyn WorkspaceClient>,
    options: TaxonomyOptions,
    cached: RwLock<Option<CachedTaxonomy>>,
}

impl TaxonomyCache {
    pub fn new(workspace: Arc<dyn WorkspaceClient>, options: TaxonomyOptions) -> Self {
        Self {
            workspace,
            options,
            cached: RwLock::new(None),
        }
    }

    /// Returns a snapshot, rebuilding if the cache is cold or expired.
    pub async fn get(&self) -> Result<Arc<Vec<TaxonomyEntry>>, Error> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.built_at.elapsed() < self.options.cache_ttl {
                    return Ok(cached.entries.clone());
                }
            }
        }

        let mut guard = self.cached.write().await;
        // Another caller may have rebuilt while we waited for the write lock.
        if let Some(cached) = guard.as_ref() {
            if cached.built_at.elapsed() < self.options.cache_ttl {
                return Ok(cached.entries.clone());
            }
        }
        let entries = Arc::new(self.build().await?);
        *guard = Some(CachedTaxonomy {
            entries: entries.clone(),
            built_at: Instant::now(),
        });
        Ok(entries)
    }

    /// Forces a rebuild regardless of TTL. Used by the warmup task.
    pub async fn refresh(&self) -> Result<(), Error> {
        let entries = Arc::new(self.build().await?);
        let mut guard = self.cached.write().await;
        *guard = Some(CachedTaxonomy {
            entries,
            built_at: Instant::now(),
        });
        Ok(())
    }

    /// Checks whether a collection ID is present in the given snapshot.
    pub fn contains(entries: &[TaxonomyEntry], collection_id: &str) -> bool {
        entries.iter().any(|e| e.collection_id == collection_id)
    }

    async fn build(&self) -> Result<Vec<TaxonomyEntry>, Error> {
        let collections = self.workspace.list_collections().await?;
        let mut entries = Vec::with_capacity(collections.len());
        for collection in collections {
            let sample_titles = if self.options.include_sample_documents
                && self.options.max_samples_per_collection > 0
            {
                self.workspace
                    .list_documents(&collection.id, self.options.max_samples_per_collection)
                    .await?
                    .into_iter()
                    .map(|d| d.title)
                    .collect()
            } else {
                Vec::new()
            };
            entries.push(TaxonomyEntry {
                collection_id: collection.id,
                name: collection.name,
                description: collection.description,
                sample_titles,
            });
        }
        tracing::debug!(collections = entries.len(), "taxonomy rebuilt");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{Collection, MockWorkspace};
    use std::sync::atomic::Ordering;

    fn cache_with_one_collection() -> (Arc<MockWorkspace>, TaxonomyCache) {
        let workspace = Arc::new(MockWorkspace::new());
        workspace.insert_collection(Collection {
            id: "col-eng".into(),
            name: "Engineering".into(),
            description: "Technical docs".into(),
        });
        let cache = TaxonomyCache::new(workspace.clone(), TaxonomyOptions::default());
        (workspace, cache)
    }

    #[tokio::test]
    async fn warm_cache_serves_without_rebuilding() {
        let (workspace, cache) = cache_with_one_collection();
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(workspace.list_collections_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_cold_readers_trigger_exactly_one_build() {
        let (workspace, cache) = cache_with_one_collection();
        let cache = Arc::new(cache);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await.unwrap() }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(workspace.list_collections_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_cache_rebuilds() {
        let workspace = Arc::new(MockWorkspace::new());
        workspace.insert_collection(Collection {
            id: "c".into(),
            name: "C".into(),
            description: String::new(),
        });
        let cache = TaxonomyCache::new(
            workspace.clone(),
            TaxonomyOptions {
                cache_ttl: Duration::from_millis(0),
                ..TaxonomyOptions::default()
            },
        );
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(workspace.list_collections_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn samples_bounded_per_collection() {
        let (workspace, cache) = cache_with_one_collection();
        for i in 0..10 {
            workspace.insert_document(crate::outline::Document {
                id: format!("d{i}"),
                title: format!("Doc {i}"),
                text: String::new(),
                collection_id: Some("col-eng".into()),
                ..Default::default()
            });
        }
        let entries = cache.get().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].sample_titles.len() <= 5);
    }
}
