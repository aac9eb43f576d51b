//! Document ingestion and retrieval for ragcheck.
//!
//! This crate provides:
//! - Deterministic fixed-size chunking with stable chunk ids
//! - The [`EmbeddingProvider`] port for external embedding models
//! - Vector collections: [`InMemoryVectorStore`] and the persistent [`LmdbVectorStore`]
//! - The [`IngestionPipeline`] (documents → chunks → vectors → collection)
//! - The [`Retriever`] (query → top-k chunk texts)
//! - Timeout and bounded retry for provider calls

pub mod ann;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod lmdb;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod retriever;
pub mod retry;
pub mod similarity;
pub mod vectorstore;

pub use ann::{
    ApproximateIndex, ApproximateIndexFactory, RandomProjectionFactory, RandomProjectionIndex,
};
pub use chunking::{FixedSizeChunker, chunk_id};
pub use config::{RagConfig, RagConfigBuilder, StoreConfig};
pub use document::{CharSpan, Chunk, Document, EmbeddingVector, SearchResult, VectorEntry};
pub use embedding::EmbeddingProvider;
pub use error::{ProviderErrorKind, RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use lmdb::LmdbVectorStore;
pub use pipeline::{IngestionPipeline, IngestionPipelineBuilder, IngestionReport};
pub use retriever::{Retriever, RetrieverConfig};
pub use retry::{RetryPolicy, RetryableError, with_retry};
pub use similarity::cosine_similarity;
pub use vectorstore::VectorStore;
