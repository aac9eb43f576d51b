//! Query-time retrieval: query text → embedding → top-k chunk texts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, with_retry};
use crate::vectorstore::{VectorStore, validate_k};

/// Settings for a [`Retriever`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Timeout and retry settings for the query embedding call.
    pub retry: RetryPolicy,
    /// Drop hits scoring below this value. `None` keeps every hit.
    pub similarity_threshold: Option<f32>,
}

impl From<&RagConfig> for RetrieverConfig {
    fn from(config: &RagConfig) -> Self {
        Self { retry: config.retry.clone(), similarity_threshold: config.similarity_threshold }
    }
}

/// Maps a query string to the most similar stored chunks.
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        config: RetrieverConfig,
    ) -> Self {
        Self { embedding_provider, vector_store, config }
    }

    /// Build a retriever sharing the retry policy and similarity threshold
    /// of the ingestion configuration.
    pub fn from_config(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        config: &RagConfig,
    ) -> Self {
        Self::new(embedding_provider, vector_store, RetrieverConfig::from(config))
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Return the texts of the `k` chunks most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `k` is zero
    /// - [`RagError::RetrievalError`] if the query cannot be embedded
    /// - [`RagError::CollectionNotFound`] if the collection was never created
    pub async fn retrieve(&self, collection: &str, query: &str, k: usize) -> Result<Vec<String>> {
        let hits = self.retrieve_scored(collection, query, k).await?;
        Ok(hits.into_iter().map(|hit| hit.text).collect())
    }

    /// Like [`retrieve`](Retriever::retrieve) but returns full search results.
    pub async fn retrieve_scored(
        &self,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_k(k)?;

        let provider = self.embedding_provider.as_ref();
        let embedding = with_retry(&self.config.retry, provider.name(), || provider.embed(query))
            .await
            .map_err(|e| {
                error!(collection, error = %e, "query embedding failed");
                RagError::RetrievalError { collection: collection.to_string(), source: Box::new(e) }
            })?;

        let mut hits = self.vector_store.query(collection, &embedding, k).await?;
        if let Some(threshold) = self.config.similarity_threshold {
            hits.retain(|hit| hit.score >= threshold);
        }

        info!(collection, k, result_count = hits.len(), "retrieval completed");
        Ok(hits)
    }
}
