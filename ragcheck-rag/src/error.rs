//! Error types for the `ragcheck-rag` crate.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryableError;

/// Classification of a failed call to an external provider.
///
/// Only [`RateLimited`](ProviderErrorKind::RateLimited) and
/// [`Timeout`](ProviderErrorKind::Timeout) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The provider rejected the call because of a rate or quota limit.
    RateLimited,
    /// The call did not complete within the configured timeout.
    Timeout,
    /// The provider rejected the input (bad request, malformed response).
    InvalidInput,
    /// Any other transport or server failure.
    Unavailable,
}

impl ProviderErrorKind {
    /// Whether a call failing with this kind may succeed when repeated.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid input",
            Self::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// Errors that can occur in chunking, storage, ingestion and retrieval.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error. Raised before any work starts.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}, {kind}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// What kind of failure occurred.
        kind: ProviderErrorKind,
        /// A description of the failure.
        message: String,
    },

    /// A vector's length disagrees with the collection's dimension.
    #[error("Dimension mismatch in collection '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The collection being written or queried.
        collection: String,
        /// The established dimension.
        expected: usize,
        /// The offending vector length.
        actual: usize,
    },

    /// The named collection has never been created.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Computing the query embedding failed.
    #[error("Retrieval from '{collection}' failed: {source}")]
    RetrievalError {
        /// The collection that was being queried.
        collection: String,
        /// The underlying embedding failure.
        #[source]
        source: Box<RagError>,
    },

    /// An ingestion run stopped at a failing batch.
    ///
    /// Batches before `batch` were already stored and stay stored.
    #[error("Ingestion failed at batch {batch} after storing {vectors_stored} vectors: {source}")]
    IngestionFailed {
        /// Zero-based index of the batch that failed.
        batch: usize,
        /// Number of vectors upserted before the failure.
        vectors_stored: usize,
        /// The failure that stopped the run.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Build an [`RagError::EmbeddingError`].
    pub fn embedding(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::EmbeddingError { provider: provider.into(), kind, message: message.into() }
    }

    pub(crate) fn store(backend: &str, message: impl fmt::Display) -> Self {
        Self::VectorStoreError { backend: backend.to_string(), message: message.to_string() }
    }

    /// The provider failure kind, if this error came from a provider call.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::EmbeddingError { kind, .. } => Some(*kind),
            Self::RetrievalError { source, .. } | Self::IngestionFailed { source, .. } => {
                source.provider_kind()
            }
            _ => None,
        }
    }
}

impl RetryableError for RagError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::EmbeddingError { kind, .. } if kind.is_retryable())
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        Self::embedding(
            operation,
            ProviderErrorKind::Timeout,
            format!("no response after {} ms", after.as_millis()),
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
