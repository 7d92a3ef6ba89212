//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full workflow by composing a
//! [`Loader`], a [`Chunker`], an [`EmbeddingProvider`], a [`VectorStore`] and
//! a [`Responder`]: sources are loaded, split, embedded and stored at ingest
//! time, and questions are embedded, matched and answered at query time.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragdeck::{RagPipeline, RagConfig, InMemoryVectorStore, FixedSizeChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chunker(Arc::new(FixedSizeChunker::new(512, 100)))
//!     .language_model(Arc::new(ExtractiveModel))
//!     .build()?;
//!
//! pipeline.create_collection("docs").await?;
//! pipeline.ingest("docs", &document).await?;
//! let answer = pipeline.ask("docs", "What is Rust?").await?;
//! ```

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Answer, Chunk, Document, SearchResult};
use crate::embedding::{EmbeddingProvider, check_dimensions};
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::loader::Loader;
use crate::responder::Responder;
use crate::retry::with_timeout;
use crate::vectorstore::VectorStore;

/// A document that could not be ingested.
#[derive(Debug)]
pub struct IngestFailure {
    /// The document ID, or the locator for sources that failed to load.
    pub document_id: String,
    /// Why ingestion failed.
    pub error: RagError,
}

/// The outcome of a batch ingestion.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Total chunks written to the store.
    pub chunks_stored: usize,
    /// Documents that were fully ingested.
    pub documents_ingested: usize,
    /// Documents (or sources) that were skipped, in input order.
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    /// `true` when nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (chunk → embed → store) and query
/// execution (embed → search → filter → respond). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    loader: Option<Arc<dyn Loader>>,
    responder: Option<Responder>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
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

    /// Create a named collection in the vector store.
    ///
    /// The collection is created with the dimensionality reported by the
    /// configured [`EmbeddingProvider`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the collection already
    /// exists with a different dimensionality, or the store's own error.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        self.vector_store
            .create_collection(name, dimensions)
            .await
            .inspect_err(|e| error!(collection = name, error = %e, "failed to create collection"))
    }

    /// Delete a named collection from the vector store.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store
            .delete_collection(name)
            .await
            .inspect_err(|e| error!(collection = name, error = %e, "failed to delete collection"))
    }

    /// Embed `texts` under the request timeout and retry policy, checking the
    /// count and dimensionality of the result.
    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let provider = &self.embedding_provider;
        let timeout = self.config.request_timeout();
        let vectors = self
            .config
            .retry
            .run("embed", move || async move {
                with_timeout("embed", timeout, provider.embed_batch(texts)).await
            })
            .await?;

        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: provider.name().to_string(),
                message: format!("returned {} vectors for {} texts", vectors.len(), texts.len()),
                transient: false,
            });
        }
        check_dimensions(provider.as_ref(), &vectors)?;
        Ok(vectors)
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Chunks are embedded in batches of `embed_batch_size`. Nothing is
    /// written unless every chunk was embedded. The new chunks then replace
    /// whatever the store held for `document.id`, so re-ingesting a changed
    /// document leaves none of its old chunks behind. Returns the chunks that
    /// were stored (with embeddings attached).
    ///
    /// # Errors
    ///
    /// Returns the first embedding, timeout or store error encountered.
    pub async fn ingest(&self, collection: &str, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            self.vector_store.replace_document(collection, &document.id, &[]).await?;
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(chunks);
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embed_texts(&texts).await.inspect_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            })?;
            debug!(document.id = %document.id, batch_size = texts.len(), "embedded batch");
            embeddings.extend(vectors);
        }

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        self.vector_store
            .replace_document(collection, &document.id, &chunks)
            .await
            .inspect_err(|e| {
                error!(document.id = %document.id, error = %e, "upsert failed during ingestion");
            })?;

        let chunk_count = chunks.len();
        info!(document.id = %document.id, collection, chunk_count, "ingested document");

        Ok(chunks)
    }

    /// Ingest multiple documents concurrently.
    ///
    /// At most `ingest_concurrency` documents are in flight at once. A
    /// document that fails is recorded in the report and does not stop the
    /// others.
    pub async fn ingest_batch(&self, collection: &str, documents: &[Document]) -> IngestReport {
        let mut outcomes: Vec<(usize, &Document, Result<Vec<Chunk>>)> =
            stream::iter(documents.iter().enumerate())
                .map(|(position, document)| async move {
                    (position, document, self.ingest(collection, document).await)
                })
                .buffer_unordered(self.config.ingest_concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(position, _, _)| *position);

        let mut report = IngestReport::default();
        for (_, document, outcome) in outcomes {
            match outcome {
                Ok(chunks) => {
                    report.documents_ingested += 1;
                    report.chunks_stored += chunks.len();
                }
                Err(error) => {
                    report.failures.push(IngestFailure { document_id: document.id.clone(), error })
                }
            }
        }

        info!(
            collection,
            documents = report.documents_ingested,
            chunks = report.chunks_stored,
            failed = report.failures.len(),
            "batch ingestion finished"
        );
        report
    }

    /// Load `locators` with the configured [`Loader`] and ingest the results.
    ///
    /// Sources that fail to load are reported alongside documents that fail
    /// to ingest.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no loader is configured.
    pub async fn ingest_sources(&self, collection: &str, locators: &[&str]) -> Result<IngestReport> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| RagError::ConfigError("no loader configured".to_string()))?;

        let loaded = loader.load_all(locators).await;
        let mut report = self.ingest_batch(collection, &loaded.documents).await;
        report.failures.splice(
            0..0,
            loaded
                .failures
                .into_iter()
                .map(|f| IngestFailure { document_id: f.locator, error: f.error }),
        );
        Ok(report)
    }

    /// Retrieve the configured `top_k` chunks most relevant to `query`.
    ///
    /// Results below `similarity_threshold` are dropped. An empty result is
    /// not an error.
    pub async fn retrieve(&self, collection: &str, query: &str) -> Result<Vec<SearchResult>> {
        self.retrieve_with_top_k(collection, query, self.config.top_k).await
    }

    /// Retrieve the `top_k` chunks most relevant to `query`, overriding the
    /// configured value.
    pub async fn retrieve_with_top_k(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding = self
            .embed_texts(&[query])
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during query"))?
            .into_iter()
            .next()
            .unwrap_or_default();

        let results = self
            .vector_store
            .search(collection, &query_embedding, top_k)
            .await
            .inspect_err(|e| error!(collection, error = %e, "vector store search failed"))?;

        let threshold = self.config.similarity_threshold;
        let filtered: Vec<SearchResult> =
            results.into_iter().filter(|r| r.score >= threshold).collect();

        info!(collection, top_k, result_count = filtered.len(), "query completed");

        Ok(filtered)
    }

    /// Answer `question` from the chunks retrieved for it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no language model is configured,
    /// or any retrieval or generation error.
    pub async fn ask(&self, collection: &str, question: &str) -> Result<Answer> {
        self.ask_with_top_k(collection, question, self.config.top_k).await
    }

    /// [`ask`](Self::ask) with an explicit `top_k`.
    pub async fn ask_with_top_k(
        &self,
        collection: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Answer> {
        let responder = self
            .responder
            .as_ref()
            .ok_or_else(|| RagError::ConfigError("no language model configured".to_string()))?;

        let results = self.retrieve_with_top_k(collection, question, top_k).await?;
        let answer = responder.respond(question, results).await?;

        info!(collection, grounded = answer.grounded, sources = answer.sources.len(), "answered question");
        Ok(answer)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider`, `vector_store` and `chunker` are required.
/// A `loader` enables [`RagPipeline::ingest_sources`]; a `language_model` (or
/// a fully configured `responder`) enables [`RagPipeline::ask`]. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    loader: Option<Arc<dyn Loader>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    responder: Option<Responder>,
}

impl RagPipelineBuilder {
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

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the source loader.
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the language model; a [`Responder`] is derived from the config.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Set a fully configured responder. Takes precedence over
    /// [`language_model`](Self::language_model).
    pub fn responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;

        let responder = self
            .responder
            .or_else(|| self.language_model.map(|model| Responder::from_config(model, &config)));

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            loader: self.loader,
            responder,
        })
    }
}
