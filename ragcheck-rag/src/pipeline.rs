//! Ingestion pipeline: documents → chunks → vectors → stored collection.
//!
//! The [`IngestionPipeline`] composes an [`EmbeddingProvider`] and a
//! [`VectorStore`]. Chunk texts are embedded in batches, several batches in
//! flight at once, and the batches are stored strictly in order.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragcheck_rag::{IngestionPipeline, RagConfig, LmdbVectorStore, StoreConfig};
//!
//! let pipeline = IngestionPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(LmdbVectorStore::open(StoreConfig::new("./db"))?))
//!     .build()?;
//!
//! let report = pipeline.ingest(&documents, "company_documents", 1000, 200).await?;
//! ```

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::FixedSizeChunker;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, EmbeddingVector, VectorEntry};
use crate::embedding::EmbeddingProvider;
use crate::error::{ProviderErrorKind, RagError, Result};
use crate::retry::with_retry;
use crate::vectorstore::VectorStore;

/// Outcome of a successful ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionReport {
    /// Documents that produced at least one chunk.
    pub documents_processed: usize,
    /// Ids of documents skipped because their text was empty.
    pub documents_skipped: Vec<String>,
    /// Chunks produced across all documents.
    pub chunks_created: usize,
    /// Vectors written to the collection.
    pub vectors_stored: usize,
    /// Embedding calls made (one per batch, retries not counted).
    pub batches: usize,
}

/// The ingestion pipeline orchestrator.
///
/// Construct one via [`IngestionPipeline::builder()`].
pub struct IngestionPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Ingest documents with the configured chunk size and overlap.
    pub async fn ingest_with_defaults(
        &self,
        documents: &[Document],
        collection: &str,
    ) -> Result<IngestionReport> {
        self.ingest(documents, collection, self.config.chunk_size, self.config.chunk_overlap).await
    }

    /// Chunk, embed and store `documents` in `collection`.
    ///
    /// Documents with empty text are skipped with a warning. Re-ingesting a
    /// document overwrites its chunks, because chunk ids are derived from the
    /// document id and chunk position.
    ///
    /// # Partial failure
    ///
    /// Ingestion is at-least-once, not all-or-nothing. Batches are stored in
    /// order; if a batch cannot be embedded (after retries) or stored, the run
    /// stops with [`RagError::IngestionFailed`], which reports how many
    /// vectors earlier batches already stored. Those vectors stay in the
    /// collection; nothing from the failed batch or later batches is stored.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] before any work if `chunk_overlap >= chunk_size`
    /// - [`RagError::IngestionFailed`] if a batch fails
    pub async fn ingest(
        &self,
        documents: &[Document],
        collection: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IngestionReport> {
        let chunker = FixedSizeChunker::new(chunk_size, chunk_overlap)?;

        let mut report = IngestionReport::default();
        let mut chunks: Vec<Chunk> = Vec::new();
        for document in documents {
            let document_chunks = chunker.chunk(document);
            if document_chunks.is_empty() {
                warn!(document.id = %document.id, "skipping document with empty text");
                report.documents_skipped.push(document.id.clone());
                continue;
            }
            report.documents_processed += 1;
            chunks.extend(document_chunks);
        }
        report.chunks_created = chunks.len();

        self.vector_store.create_collection(collection).await.map_err(|e| {
            error!(collection, error = %e, "failed to create collection");
            e
        })?;

        let batches: Vec<&[Chunk]> = chunks.chunks(self.config.embed_batch_size).collect();
        report.batches = batches.len();

        // `buffered` keeps up to N embedding calls in flight but yields
        // results in batch order.
        let mut embedded = stream::iter(batches.iter().copied())
            .map(|batch| self.embed_batch(batch))
            .buffered(self.config.max_concurrent_batches);

        let mut batch_index = 0;
        while let Some(result) = embedded.next().await {
            let outcome = match result {
                Ok(entries) => self.vector_store.upsert(collection, &entries).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(stored) => {
                    debug!(collection, batch = batch_index, stored, "stored batch");
                    report.vectors_stored += stored;
                }
                Err(e) => {
                    error!(
                        collection,
                        batch = batch_index,
                        vectors_stored = report.vectors_stored,
                        error = %e,
                        "ingestion failed"
                    );
                    return Err(RagError::IngestionFailed {
                        batch: batch_index,
                        vectors_stored: report.vectors_stored,
                        source: Box::new(e),
                    });
                }
            }
            batch_index += 1;
        }

        info!(
            collection,
            documents = report.documents_processed,
            skipped = report.documents_skipped.len(),
            chunks = report.chunks_created,
            vectors = report.vectors_stored,
            "ingestion completed"
        );
        Ok(report)
    }

    /// Embed one batch and pair every vector with its chunk.
    async fn embed_batch(&self, batch: &[Chunk]) -> Result<Vec<VectorEntry>> {
        let provider = self.embedding_provider.as_ref();
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors =
            with_retry(&self.config.retry, provider.name(), || provider.embed_batch(&texts)).await?;

        if vectors.len() != batch.len() {
            return Err(RagError::embedding(
                provider.name(),
                ProviderErrorKind::InvalidInput,
                format!("returned {} vectors for {} texts", vectors.len(), batch.len()),
            ));
        }

        let expected = provider.dimensions();
        batch
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                if values.len() != expected {
                    return Err(RagError::DimensionMismatch {
                        collection: format!("{} output", provider.name()),
                        expected,
                        actual: values.len(),
                    });
                }
                let embedding = EmbeddingVector { chunk_id: chunk.id.clone(), values };
                Ok(VectorEntry::from_chunk(chunk.clone(), embedding))
            })
            .collect()
    }
}

/// Builder for constructing an [`IngestionPipeline`].
///
/// The embedding provider and vector store are required; the configuration
/// defaults to [`RagConfig::default()`].
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl IngestionPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Build the [`IngestionPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<IngestionPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;

        Ok(IngestionPipeline { config, embedding_provider, vector_store })
    }
}
