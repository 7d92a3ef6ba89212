//! End-to-end tests for ingestion and question answering through `RagPipeline`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragdeck::{
    Document, EmbeddingProvider, FileLoader, FixedSizeChunker, HashEmbeddingProvider,
    InMemoryVectorStore, MockLanguageModel, NOT_AVAILABLE, RagConfig, RagError, RagPipeline,
    Result, RetryConfig, VectorStore, WordChunker,
};

const COLLECTION: &str = "deck";

fn config() -> RagConfig {
    RagConfig::builder()
        .chunk_size(8)
        .chunk_overlap(2)
        .top_k(3)
        .retry(RetryConfig::new(2, Duration::from_millis(10)))
        .build()
        .unwrap()
}

fn pipeline_with(
    config: RagConfig,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<InMemoryVectorStore>,
    model: Option<Arc<MockLanguageModel>>,
) -> RagPipeline {
    let mut builder = RagPipeline::builder()
        .chunker(Arc::new(WordChunker::new(config.chunk_size, config.chunk_overlap)))
        .config(config)
        .embedding_provider(provider)
        .vector_store(store);
    if let Some(model) = model {
        builder = builder.language_model(model);
    }
    builder.build().unwrap()
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("rust", "Rust guarantees memory safety without a garbage collector"),
        Document::new("bread", "Bake bread with flour water salt and yeast"),
        Document::new("tea", "Green tea is steeped in hot water for three minutes"),
    ]
}

/// Wraps the hashing embedder, recording batch sizes and concurrency and
/// failing on demand.
#[derive(Default)]
struct ScriptedProvider {
    inner: HashEmbeddingProvider,
    batches: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    transient_failures: AtomicUsize,
    poison: Option<&'static str>,
    delay: Option<Duration>,
    wrong_dimensions: bool,
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(texts.len());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RagError::Timeout {
                operation: "scripted".into(),
                timeout: Duration::from_millis(1),
            });
        }
        if let Some(poison) = self.poison {
            if texts.iter().any(|t| t.contains(poison)) {
                return Err(RagError::EmbeddingError {
                    provider: "scripted".into(),
                    message: "refused input".into(),
                    transient: false,
                });
            }
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let mut v = self.inner.embed(text).await?;
            if self.wrong_dimensions {
                v.pop();
            }
            vectors.push(v);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test]
async fn ingest_then_retrieve_finds_relevant_document() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline_with(config(), Arc::new(HashEmbeddingProvider::default()), store.clone(), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let report = pipeline.ingest_batch(COLLECTION, &corpus()).await;
    assert!(report.is_complete());
    assert_eq!(report.documents_ingested, 3);
    assert_eq!(report.chunks_stored, store.count(COLLECTION).await.unwrap());

    let results = pipeline.retrieve(COLLECTION, "memory safety in Rust").await.unwrap();
    assert!(!results.is_empty() && results.len() <= 3);
    assert_eq!(results[0].chunk.document_id, "rust");
    for window in results.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
}

#[tokio::test]
async fn ingesting_twice_is_idempotent() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline_with(config(), Arc::new(HashEmbeddingProvider::default()), store.clone(), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let docs = corpus();
    pipeline.ingest_batch(COLLECTION, &docs).await;
    let first = store.count(COLLECTION).await.unwrap();
    pipeline.ingest_batch(COLLECTION, &docs).await;
    assert_eq!(store.count(COLLECTION).await.unwrap(), first);
}

#[tokio::test]
async fn reingesting_a_shorter_document_drops_old_chunks() {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig { chunk_size: 2, chunk_overlap: 0, top_k: 10, ..config() };
    let pipeline =
        pipeline_with(config, Arc::new(HashEmbeddingProvider::default()), store.clone(), None);
    pipeline.create_collection(COLLECTION).await.unwrap();
    pipeline.ingest(COLLECTION, &Document::new("notes", "kept words")).await.unwrap();

    let long = Document::new("deck", "one two three four five six");
    assert_eq!(pipeline.ingest(COLLECTION, &long).await.unwrap().len(), 3);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 4);

    let short = Document::new("deck", "alpha beta");
    assert_eq!(pipeline.ingest(COLLECTION, &short).await.unwrap().len(), 1);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 2);

    let results = pipeline.retrieve_with_top_k(COLLECTION, "five six", 10).await.unwrap();
    let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
    assert!(!texts.contains(&"five six") && !texts.contains(&"three four"));

    let empty = Document::new("deck", "");
    assert!(pipeline.ingest(COLLECTION, &empty).await.unwrap().is_empty());
    assert_eq!(store.count(COLLECTION).await.unwrap(), 1);
}

#[tokio::test]
async fn embeddings_are_requested_in_configured_batches() {
    let provider = Arc::new(ScriptedProvider::default());
    let config = RagConfig { embed_batch_size: 4, ..config() };
    let pipeline =
        pipeline_with(config, provider.clone(), Arc::new(InMemoryVectorStore::new()), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    // 62 words in windows of 8 advancing by 6: ten chunks.
    let text = (0..62).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let chunks = pipeline.ingest(COLLECTION, &Document::new("long", text)).await.unwrap();
    assert_eq!(chunks.len(), 10);
    assert_eq!(*provider.batches.lock().unwrap(), vec![4, 4, 2]);
    assert!(chunks.iter().all(|c| c.embedding.len() == provider.dimensions()));
}

#[tokio::test]
async fn failing_document_does_not_abort_batch() {
    let provider = Arc::new(ScriptedProvider { poison: Some("yeast"), ..Default::default() });
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(config(), provider, store.clone(), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let report = pipeline.ingest_batch(COLLECTION, &corpus()).await;
    assert_eq!(report.documents_ingested, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_id, "bread");
    assert!(matches!(report.failures[0].error, RagError::EmbeddingError { .. }));

    let ids: Vec<String> = store
        .search(COLLECTION, &HashEmbeddingProvider::default().embed("bread").await.unwrap(), 100)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.chunk.document_id)
        .collect();
    assert!(!ids.iter().any(|id| id == "bread"), "failed document left partial records");
}

#[tokio::test(start_paused = true)]
async fn transient_embedding_failures_are_retried() {
    let provider =
        Arc::new(ScriptedProvider { transient_failures: AtomicUsize::new(2), ..Default::default() });
    let pipeline =
        pipeline_with(config(), provider.clone(), Arc::new(InMemoryVectorStore::new()), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let chunks = pipeline.ingest(COLLECTION, &corpus()[0]).await.unwrap();
    assert!(!chunks.is_empty());
    assert_eq!(provider.batches.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_embedder_times_out() {
    let provider =
        Arc::new(ScriptedProvider { delay: Some(Duration::from_secs(120)), ..Default::default() });
    let config = RagConfig {
        request_timeout_secs: 1,
        retry: RetryConfig::no_retry(),
        ..config()
    };
    let pipeline = pipeline_with(config, provider, Arc::new(InMemoryVectorStore::new()), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let err = pipeline.retrieve(COLLECTION, "anything").await.unwrap_err();
    assert!(matches!(err, RagError::Timeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn ingestion_concurrency_is_bounded() {
    let provider =
        Arc::new(ScriptedProvider { delay: Some(Duration::from_millis(50)), ..Default::default() });
    let config = RagConfig { ingest_concurrency: 2, ..config() };
    let pipeline =
        pipeline_with(config, provider.clone(), Arc::new(InMemoryVectorStore::new()), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let documents: Vec<Document> =
        (0..8).map(|i| Document::new(format!("doc{i}"), format!("document number {i}"))).collect();
    let report = pipeline.ingest_batch(COLLECTION, &documents).await;

    assert_eq!(report.documents_ingested, 8);
    let peak = provider.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency {peak}");
    assert_eq!(peak, 2);
}

#[tokio::test]
async fn wrong_embedding_dimensions_store_nothing() {
    let provider = Arc::new(ScriptedProvider { wrong_dimensions: true, ..Default::default() });
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(config(), provider, store.clone(), None);
    pipeline.create_collection(COLLECTION).await.unwrap();

    let err = pipeline.ingest(COLLECTION, &corpus()[0]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert_eq!(store.count(COLLECTION).await.unwrap(), 0);
}

#[tokio::test]
async fn collection_with_other_dimensions_is_rejected() {
    let store = Arc::new(InMemoryVectorStore::new());
    store.create_collection(COLLECTION, 3).await.unwrap();
    let pipeline = pipeline_with(config(), Arc::new(HashEmbeddingProvider::new(16)), store, None);

    let err = pipeline.create_collection(COLLECTION).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 16 }));
}

#[tokio::test]
async fn similarity_threshold_filters_results() {
    let config = RagConfig { similarity_threshold: 0.99, ..config() };
    let pipeline = pipeline_with(
        config,
        Arc::new(HashEmbeddingProvider::default()),
        Arc::new(InMemoryVectorStore::new()),
        None,
    );
    pipeline.create_collection(COLLECTION).await.unwrap();
    pipeline.ingest_batch(COLLECTION, &corpus()).await;

    let results = pipeline.retrieve(COLLECTION, "completely unrelated words").await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn ask_answers_from_retrieved_context() {
    let model = Arc::new(MockLanguageModel::new("Rust is memory safe."));
    let pipeline = pipeline_with(
        config(),
        Arc::new(HashEmbeddingProvider::default()),
        Arc::new(InMemoryVectorStore::new()),
        Some(model.clone()),
    );
    pipeline.create_collection(COLLECTION).await.unwrap();
    pipeline.ingest_batch(COLLECTION, &corpus()).await;

    let answer = pipeline.ask(COLLECTION, "Is Rust memory safe?").await.unwrap();
    assert!(answer.grounded);
    assert_eq!(answer.text, "Rust is memory safe.");
    assert!(!answer.sources.is_empty());

    let prompt = &model.prompts()[0];
    assert_eq!(prompt.question, "Is Rust memory safe?");
    assert_eq!(prompt.context[0], answer.sources[0].chunk.text);
}

#[tokio::test]
async fn empty_retrieval_answers_not_available_without_calling_model() {
    let model = Arc::new(MockLanguageModel::new("fabricated"));
    let pipeline = pipeline_with(
        config(),
        Arc::new(HashEmbeddingProvider::default()),
        Arc::new(InMemoryVectorStore::new()),
        Some(model.clone()),
    );
    pipeline.create_collection(COLLECTION).await.unwrap();

    let answer = pipeline.ask(COLLECTION, "What is the capital of France?").await.unwrap();
    assert_eq!(answer.text, NOT_AVAILABLE);
    assert!(!answer.grounded);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn ingest_sources_reports_load_and_ingest_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("slides.txt");
    tokio::fs::write(&good, "Retrieval augmented generation grounds answers in documents")
        .await
        .unwrap();
    let missing = dir.path().join("missing.txt");

    let pipeline = RagPipeline::builder()
        .config(config())
        .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .chunker(Arc::new(FixedSizeChunker::new(40, 10)))
        .loader(Arc::new(FileLoader::new()))
        .build()
        .unwrap();
    pipeline.create_collection(COLLECTION).await.unwrap();

    let report = pipeline
        .ingest_sources(COLLECTION, &[good.to_str().unwrap(), missing.to_str().unwrap()])
        .await
        .unwrap();
    assert_eq!(report.documents_ingested, 1);
    assert!(report.chunks_stored > 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_id, missing.to_str().unwrap());
    assert!(matches!(report.failures[0].error, RagError::FetchError { transient: false, .. }));
}
