//! Configuration for chunking, ingestion, retrieval and storage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// Configuration parameters for ingestion and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Minimum similarity score for retrieved hits. `None` keeps every hit.
    pub similarity_threshold: Option<f32>,
    /// Number of chunk texts sent to the embedding provider per call.
    pub embed_batch_size: usize,
    /// Maximum number of embedding calls in flight at once.
    pub max_concurrent_batches: usize,
    /// Timeout and retry settings for embedding calls.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            similarity_threshold: None,
            embed_batch_size: 64,
            max_concurrent_batches: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("cannot read configuration '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `embed_batch_size == 0` or `max_concurrent_batches == 0`
    /// - the retry policy is invalid
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(RagError::ConfigError(
                "max_concurrent_batches must be greater than zero".to_string(),
            ));
        }
        self.retry.validate()
    }
}

pub(crate) fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set how many chunk texts go into one embedding call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the maximum number of embedding calls in flight.
    pub fn max_concurrent_batches(mut self, max: usize) -> Self {
        self.config.max_concurrent_batches = max;
        self
    }

    /// Set the timeout and retry policy for embedding calls, both at ingestion
    /// and for query embeddings.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Storage settings for [`LmdbVectorStore`](crate::lmdb::LmdbVectorStore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Directory holding one LMDB environment per collection.
    pub root: PathBuf,
    /// Maximum size of one collection's memory map, in bytes.
    pub map_size: usize,
    /// Collections with at most this many entries are always searched exactly.
    pub exact_search_limit: usize,
    /// Approximate search scores `k * candidate_multiplier` candidates exactly.
    pub candidate_multiplier: usize,
}

impl StoreConfig {
    /// Settings rooted at `root` with default limits.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            map_size: 1024 * 1024 * 1024,
            exact_search_limit: 5_000,
            candidate_multiplier: 10,
        }
    }

    /// Set the maximum memory map size per collection.
    pub fn with_map_size(mut self, bytes: usize) -> Self {
        self.map_size = bytes;
        self
    }

    /// Set the collection size above which approximate search may be used.
    pub fn with_exact_search_limit(mut self, limit: usize) -> Self {
        self.exact_search_limit = limit;
        self
    }

    /// Set the candidate oversampling factor for approximate search.
    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier;
        self
    }
}
