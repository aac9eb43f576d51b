//! Deterministic fixed-size chunking.
//!
//! Chunk boundaries are plain character offsets: no tokenizer and no
//! whitespace-aware splitting. The same `(text, size, overlap)` always yields
//! the same spans and the same chunk ids, on every platform.

use crate::config::validate_chunking;
use crate::document::{CharSpan, Chunk, Document};
use crate::error::Result;

/// Identifier of the `index`-th chunk of a document.
///
/// ```
/// assert_eq!(ragcheck_rag::chunk_id("handbook", 2), "handbook_chunk_2");
/// ```
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{document_id}_chunk_{index}")
}

/// Splits text into fixed-size chunks by character count with a fixed overlap.
///
/// Each chunk inherits the parent document's metadata plus `document_id` and
/// `chunk_index` fields.
///
/// # Example
///
/// ```rust,ignore
/// use ragcheck_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Compute chunk spans for a text of `char_count` characters.
    pub fn spans(&self, char_count: usize) -> Vec<CharSpan> {
        let step = self.chunk_size - self.chunk_overlap;
        let mut spans = Vec::with_capacity(char_count.div_ceil(step));
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            spans.push(CharSpan::new(start, end));
            if end == char_count {
                break;
            }
            start += step;
        }
        spans
    }

    /// Split text into `(span, substring)` pairs.
    pub fn split<'a>(&self, text: &'a str) -> Vec<(CharSpan, &'a str)> {
        // Byte offset of every char boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;

        self.spans(char_count)
            .into_iter()
            .map(|span| (span, &text[boundaries[span.start]..boundaries[span.end]]))
            .collect()
    }

    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, (char_span, text))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("document_id".to_string(), document.id.clone());
                metadata.insert("chunk_index".to_string(), index.to_string());
                Chunk {
                    id: chunk_id(&document.id, index),
                    text: text.to_string(),
                    document_id: document.id.clone(),
                    index,
                    char_span,
                    metadata,
                }
            })
            .collect()
    }
}
