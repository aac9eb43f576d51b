//! Data types for documents, chunks, stored entries and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new() }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A half-open `[start, end)` range measured in characters, not bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A contiguous segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic identifier, see [`chunk_id`](crate::chunking::chunk_id).
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Zero-based position of the chunk within its document.
    pub index: usize,
    /// Character range of the chunk within the document text.
    pub char_span: CharSpan,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
}

/// An embedding vector computed for one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingVector {
    pub chunk_id: String,
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// One entry of a vector collection: a chunk's vector plus its payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorEntry {
    /// Key of the entry within its collection.
    pub chunk_id: String,
    /// The chunk's embedding.
    pub vector: Vec<f32>,
    /// The chunk's text.
    pub text: String,
    /// The chunk's metadata.
    pub metadata: HashMap<String, String>,
}

impl VectorEntry {
    /// Pair a chunk with its embedding.
    pub fn from_chunk(chunk: Chunk, embedding: EmbeddingVector) -> Self {
        debug_assert_eq!(chunk.id, embedding.chunk_id);
        Self { chunk_id: chunk.id, vector: embedding.values, text: chunk.text, metadata: chunk.metadata }
    }
}

/// A stored entry returned by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    /// Cosine similarity to the query vector (higher is more relevant).
    pub score: f32,
}
