//! Vector store trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{SearchResult, VectorEntry};
use crate::error::{RagError, Result};

/// A storage backend for named collections of chunk vectors.
///
/// Contract shared by every backend:
///
/// - chunk ids are unique within a collection; upserting an existing id
///   replaces its vector, text and metadata in one step,
/// - the first non-empty upsert fixes the collection's dimension, and any
///   later vector of another length is rejected with
///   [`RagError::DimensionMismatch`],
/// - a single [`upsert`](VectorStore::upsert) call is applied atomically:
///   a concurrent query observes all of it or none of it,
/// - [`query`](VectorStore::query) ranks by descending cosine similarity and
///   breaks ties by ascending chunk id.
///
/// # Example
///
/// ```rust,ignore
/// use ragcheck_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert("docs", &entries).await?;
/// let results = store.query("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace entries, creating the collection if needed.
    ///
    /// Returns the number of entries written.
    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<usize>;

    /// Return the `k` entries most similar to `embedding`.
    ///
    /// Returns fewer than `k` results only when the collection holds fewer
    /// entries, and an empty `Vec` for an empty collection.
    ///
    /// # Errors
    ///
    /// [`RagError::CollectionNotFound`] if the collection was never created,
    /// [`RagError::ConfigError`] if `k` is zero.
    async fn query(&self, collection: &str, embedding: &[f32], k: usize)
    -> Result<Vec<SearchResult>>;

    /// Number of entries stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// The dimension fixed by the first upsert, if any vector was stored yet.
    async fn dimensions(&self, collection: &str) -> Result<Option<usize>>;
}

/// Check `entries` against an established (or to-be-established) dimension
/// and reject vectors with NaN or infinite components.
///
/// Returns the dimension the collection has after the upsert.
pub(crate) fn check_dimensions(
    collection: &str,
    established: Option<usize>,
    entries: &[VectorEntry],
) -> Result<Option<usize>> {
    if let Some(bad) = entries.iter().find(|e| e.vector.iter().any(|x| !x.is_finite())) {
        return Err(RagError::ConfigError(format!(
            "entry '{}' for '{collection}' has a non-finite vector component",
            bad.chunk_id
        )));
    }
    let expected = match established.or_else(|| entries.first().map(|e| e.vector.len())) {
        Some(expected) => expected,
        None => return Ok(None),
    };
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
        return Err(RagError::DimensionMismatch {
            collection: collection.to_string(),
            expected,
            actual: bad.vector.len(),
        });
    }
    Ok(Some(expected))
}

/// Collection names become directory names, so keep them to a safe alphabet.
pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RagError::ConfigError(format!(
            "invalid collection name '{name}': use ASCII letters, digits, '-', '_' or '.'"
        )))
    }
}

pub(crate) fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::ConfigError("k must be greater than zero".to_string()));
    }
    Ok(())
}
