//! In-memory vector store using exact cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a non-persistent vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases; use
//! [`LmdbVectorStore`](crate::lmdb::LmdbVectorStore) when the collection must
//! survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{SearchResult, VectorEntry};
use crate::error::{RagError, Result};
use crate::similarity::rank_exact;
use crate::vectorstore::{VectorStore, check_dimensions, validate_collection_name, validate_k};

#[derive(Debug, Default)]
struct MemoryCollection {
    dimensions: Option<usize>,
    entries: HashMap<String, VectorEntry>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as nested `HashMap`s: collection name → chunk ID → entry.
/// An upsert holds the write guard for the whole call, so queries see either
/// none or all of it.
///
/// # Example
///
/// ```rust,ignore
/// use ragcheck_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<usize> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().await;
        let store = collections.entry(collection.to_string()).or_default();
        store.dimensions = check_dimensions(collection, store.dimensions, entries)?;
        for entry in entries {
            store.entries.insert(entry.chunk_id.clone(), entry.clone());
        }
        Ok(entries.len())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_k(k)?;
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if let Some(expected) = store.dimensions {
            if expected != embedding.len() {
                return Err(RagError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        Ok(rank_exact(embedding, store.entries.values(), k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|store| store.entries.len())
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))
    }

    async fn dimensions(&self, collection: &str) -> Result<Option<usize>> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|store| store.dimensions)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: id.into(),
            vector,
            text: format!("text of {id}"),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_ids() {
        let store = InMemoryVectorStore::new();
        store.upsert("docs", &[entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 1.0])]).await.unwrap();
        let mut replacement = entry("a", vec![0.0, 1.0]);
        replacement.text = "replaced".into();
        store.upsert("docs", &[replacement]).await.unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 2);
        let hits = store.query("docs", &[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[0].text, "replaced");
    }

    #[tokio::test]
    async fn mismatched_dimension_stores_nothing() {
        let store = InMemoryVectorStore::new();
        store.upsert("docs", &[entry("a", vec![1.0, 0.0])]).await.unwrap();
        let err = store
            .upsert("docs", &[entry("b", vec![0.0, 1.0]), entry("c", vec![1.0, 1.0, 1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3, .. }));
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_and_missing_collections() {
        let store = InMemoryVectorStore::new();
        store.create_collection("empty").await.unwrap();
        assert!(store.query("empty", &[1.0], 3).await.unwrap().is_empty());
        assert_eq!(store.dimensions("empty").await.unwrap(), None);
        assert!(matches!(
            store.query("never", &[1.0], 3).await,
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(matches!(store.count("never").await, Err(RagError::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn zero_k_is_rejected() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs").await.unwrap();
        assert!(matches!(store.query("docs", &[1.0], 0).await, Err(RagError::ConfigError(_))));
    }

    #[tokio::test]
    async fn delete_removes_the_collection() {
        let store = InMemoryVectorStore::new();
        store.upsert("docs", &[entry("a", vec![1.0])]).await.unwrap();
        store.delete_collection("docs").await.unwrap();
        assert!(matches!(store.count("docs").await, Err(RagError::CollectionNotFound(_))));
    }
}
