//! End-to-end ingestion through the pipeline into both store backends.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{BagOfWordsEmbedder, DIM, ScriptedEmbedder, bag_of_words, text_of_len};
use ragcheck_rag::{
    Document, EmbeddingProvider, InMemoryVectorStore, IngestionPipeline, LmdbVectorStore,
    ProviderErrorKind, RagConfig, RagError, Result, RetryPolicy, SearchResult, StoreConfig,
    VectorEntry, VectorStore,
};
use ragcheck_telemetry::EventCapture;

const COLLECTION: &str = "company_documents";

fn two_documents() -> Vec<Document> {
    vec![
        Document::new("handbook", text_of_len("policy", 2500)),
        Document::new("benefits", text_of_len("insurance", 2500)).with_metadata("source", "hr"),
    ]
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, initial_backoff_ms: 10, max_backoff_ms: 40, timeout_ms: 1_000 }
}

fn pipeline(
    provider: Arc<dyn ragcheck_rag::EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: RagConfig,
) -> IngestionPipeline {
    IngestionPipeline::builder()
        .config(config)
        .embedding_provider(provider)
        .vector_store(store)
        .build()
        .unwrap()
}

/// Bag-of-words embeddings where earlier calls take longer than later ones,
/// so concurrent batches complete out of order.
#[derive(Default)]
struct StaggeredEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for StaggeredEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(bag_of_words(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = 40 - 10 * (call % 4) as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Declares one dimension more than the vectors it returns.
struct MisreportingEmbedder;

#[async_trait]
impl EmbeddingProvider for MisreportingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(bag_of_words(text))
    }

    fn dimensions(&self) -> usize {
        DIM + 1
    }

    fn name(&self) -> &str {
        "misreporting"
    }
}

/// Records every upserted entry in call order, then delegates.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryVectorStore,
    upserted: Mutex<Vec<VectorEntry>>,
}

impl RecordingStore {
    fn upserted(&self) -> Vec<VectorEntry> {
        self.upserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        self.inner.create_collection(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<usize> {
        self.upserted.lock().unwrap().extend_from_slice(entries);
        self.inner.upsert(collection, entries).await
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.inner.query(collection, embedding, k).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    async fn dimensions(&self, collection: &str) -> Result<Option<usize>> {
        self.inner.dimensions(collection).await
    }
}

#[tokio::test]
async fn two_documents_produce_six_entries_and_reingest_keeps_six() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline(Arc::new(BagOfWordsEmbedder::new()), store.clone(), RagConfig::default());
    let documents = two_documents();

    let report = pipeline.ingest(&documents, COLLECTION, 1000, 200).await.unwrap();
    assert_eq!(report.documents_processed, 2);
    assert_eq!(report.chunks_created, 6);
    assert_eq!(report.vectors_stored, 6);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 6);

    let report = pipeline.ingest(&documents[..1], COLLECTION, 1000, 200).await.unwrap();
    assert_eq!(report.vectors_stored, 3);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 6);
}

#[tokio::test]
async fn chunk_metadata_reaches_the_store() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline(Arc::new(BagOfWordsEmbedder::new()), store.clone(), RagConfig::default());

    let documents = vec![
        Document::new("handbook", "remote work requires manager approval"),
        Document::new("benefits", "dental insurance covers two cleanings").with_metadata("source", "hr"),
    ];
    pipeline.ingest_with_defaults(&documents, COLLECTION).await.unwrap();

    let query = common::bag_of_words("dental insurance covers two cleanings");
    let hits = store.query(COLLECTION, &query, 1).await.unwrap();
    assert_eq!(hits[0].chunk_id, "benefits_chunk_0");
    assert_eq!(hits[0].metadata.get("source").map(String::as_str), Some("hr"));
    assert_eq!(hits[0].metadata.get("document_id").map(String::as_str), Some("benefits"));
    assert_eq!(hits[0].metadata.get("chunk_index").map(String::as_str), Some("0"));
}

#[tokio::test]
async fn empty_documents_are_skipped_with_a_warning() {
    let capture = EventCapture::new();
    let _guard = capture.set_default();

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline(Arc::new(BagOfWordsEmbedder::new()), store.clone(), RagConfig::default());
    let documents = vec![Document::new("blank", ""), Document::new("memo", "short memo text")];

    let report = pipeline.ingest(&documents, COLLECTION, 1000, 200).await.unwrap();

    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.documents_skipped, vec!["blank".to_string()]);
    assert_eq!(report.chunks_created, 1);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 1);

    let warnings = capture.at_level("WARN");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("empty text"));
    assert_eq!(warnings[0].field("document.id").as_deref(), Some("blank"));
}

#[tokio::test]
async fn invalid_overlap_fails_before_any_work() {
    let provider = Arc::new(BagOfWordsEmbedder::new());
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline(provider.clone(), store.clone(), RagConfig::default());

    let err = pipeline.ingest(&two_documents(), COLLECTION, 200, 200).await.unwrap_err();

    assert!(matches!(err, RagError::ConfigError(_)));
    assert_eq!(provider.calls(), 0);
    assert!(matches!(store.count(COLLECTION).await, Err(RagError::CollectionNotFound(_))));
}

#[tokio::test]
async fn failed_batch_reports_what_was_already_stored() {
    let provider = Arc::new(ScriptedEmbedder::new().fail_call(1, ProviderErrorKind::InvalidInput));
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder()
        .embed_batch_size(2)
        .max_concurrent_batches(1)
        .retry(RetryPolicy::no_retry(Duration::from_secs(5)))
        .build()
        .unwrap();
    let pipeline = pipeline(provider, store.clone(), config);

    let err = pipeline.ingest(&two_documents(), COLLECTION, 1000, 200).await.unwrap_err();

    match &err {
        RagError::IngestionFailed { batch, vectors_stored, .. } => {
            assert_eq!(*batch, 1);
            assert_eq!(*vectors_stored, 2);
        }
        other => panic!("expected IngestionFailed, got {other:?}"),
    }
    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::InvalidInput));
    assert_eq!(store.count(COLLECTION).await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_batches_are_retried() {
    let provider = Arc::new(ScriptedEmbedder::new().fail_call(0, ProviderErrorKind::RateLimited));
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().retry(fast_retry()).build().unwrap();
    let pipeline = pipeline(provider.clone(), store.clone(), config);

    let report = pipeline.ingest(&two_documents(), COLLECTION, 1000, 200).await.unwrap();

    assert_eq!(report.vectors_stored, 6);
    assert_eq!(report.batches, 1);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn lmdb_ingestion_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(BagOfWordsEmbedder::new());

    {
        let store = Arc::new(LmdbVectorStore::open(StoreConfig::new(dir.path())).unwrap());
        let pipeline = pipeline(provider.clone(), store.clone(), RagConfig::default());
        pipeline.ingest(&two_documents(), COLLECTION, 1000, 200).await.unwrap();
    }

    let store = LmdbVectorStore::open(StoreConfig::new(dir.path())).unwrap();
    assert_eq!(store.count(COLLECTION).await.unwrap(), 6);
    assert_eq!(store.dimensions(COLLECTION).await.unwrap(), Some(common::DIM));
}

#[tokio::test(start_paused = true)]
async fn batch_size_and_concurrency_do_not_change_stored_vectors() {
    let ingest = |config: RagConfig| async move {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline(Arc::new(StaggeredEmbedder::default()), store.clone(), config);
        let report = pipeline.ingest(&two_documents(), COLLECTION, 1000, 200).await.unwrap();
        (report, store.upserted())
    };

    let (single, reference) = ingest(RagConfig::default()).await;
    let concurrent_config =
        RagConfig::builder().embed_batch_size(1).max_concurrent_batches(4).build().unwrap();
    let (concurrent, stored) = ingest(concurrent_config).await;

    assert_eq!(single.batches, 1);
    assert_eq!(concurrent.batches, 6);
    // Same entries, upserted in chunk order, each with its own text's vector.
    assert_eq!(stored, reference);
    for entry in &stored {
        assert_eq!(
            entry.vector,
            bag_of_words(&entry.text),
            "{} got another chunk's vector",
            entry.chunk_id
        );
    }
}

#[tokio::test]
async fn vectors_disagreeing_with_declared_dimensions_are_not_stored() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline(Arc::new(MisreportingEmbedder), store.clone(), RagConfig::default());

    let err = pipeline.ingest(&two_documents(), COLLECTION, 1000, 200).await.unwrap_err();

    match err {
        RagError::IngestionFailed { batch: 0, vectors_stored: 0, source } => {
            assert!(matches!(
                *source,
                RagError::DimensionMismatch { expected, actual, .. }
                    if expected == DIM + 1 && actual == DIM
            ));
        }
        other => panic!("expected IngestionFailed, got {other:?}"),
    }
    assert_eq!(store.count(COLLECTION).await.unwrap(), 0);
}
