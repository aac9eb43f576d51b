//! Shared fixtures: a deterministic embedder and the demo company corpus.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragcheck_eval::{EvalQuestion, QuestionSet};
use ragcheck_rag::{
    Document, EmbeddingProvider, InMemoryVectorStore, IngestionPipeline, ProviderErrorKind,
    RagConfig, RagError, RetryPolicy, Retriever, RetrieverConfig,
};

pub const COLLECTION: &str = "company_documents";
const DIM: usize = 32;

/// Hashes lowercase words into buckets; optionally rejects some texts.
#[derive(Default)]
pub struct WordHashEmbedder {
    rejected: HashSet<String>,
}

impl WordHashEmbedder {
    pub fn rejecting(texts: &[&str]) -> Self {
        Self { rejected: texts.iter().map(|t| t.to_string()).collect() }
    }
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    async fn embed(&self, text: &str) -> ragcheck_rag::Result<Vec<f32>> {
        if self.rejected.contains(text) {
            return Err(RagError::embedding("word-hash", ProviderErrorKind::InvalidInput, "rejected"));
        }
        let mut vector = vec![0.0; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100000001b3));
            vector[(hash % DIM as u64) as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "word-hash"
    }
}

pub fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("demos")
}

pub fn company_questions() -> Vec<EvalQuestion> {
    QuestionSet::from_path(demos_dir().join("company_questions.json")).unwrap().into_inner()
}

pub fn company_documents() -> Vec<Document> {
    let json = std::fs::read_to_string(demos_dir().join("company_documents.json")).unwrap();
    serde_json::from_str(&json).unwrap()
}

pub fn no_retry() -> RetryPolicy {
    RetryPolicy::no_retry(Duration::from_secs(5))
}

/// Ingest the demo corpus and return a retriever whose query embedder is `query_embedder`.
pub async fn company_retriever(query_embedder: WordHashEmbedder) -> Arc<Retriever> {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().chunk_size(300).chunk_overlap(50).build().unwrap();
    let pipeline = IngestionPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(WordHashEmbedder::default()))
        .vector_store(store.clone())
        .build()
        .unwrap();
    pipeline.ingest_with_defaults(&company_documents(), COLLECTION).await.unwrap();

    let config = RetrieverConfig { retry: no_retry(), similarity_threshold: None };
    Arc::new(Retriever::new(Arc::new(query_embedder), store, config))
}
