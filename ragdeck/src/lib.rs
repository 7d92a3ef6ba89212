//! # ragdeck
//!
//! A small Retrieval-Augmented Generation toolkit built from five explicit
//! stages:
//!
//! Loader → Splitter → Embedder → Store → Responder
//!
//! - [`Loader`] turns URLs and file paths into [`Document`]s
//!   ([`SourceLoader`], [`FileLoader`], and `WebLoader` with the `web` feature).
//! - [`Chunker`] splits documents into overlapping [`Chunk`]s
//!   ([`FixedSizeChunker`], [`WordChunker`], [`RecursiveChunker`], [`MarkdownChunker`]).
//! - [`EmbeddingProvider`] maps text to vectors ([`HashEmbeddingProvider`], and
//!   `openai::OpenAIEmbeddingProvider` with the `openai` feature).
//! - [`VectorStore`] persists records and answers top-k similarity queries
//!   ([`InMemoryVectorStore`], and `qdrant::QdrantVectorStore` with the
//!   `qdrant` feature).
//! - [`Responder`] answers a question from retrieved context with a
//!   [`LanguageModel`], refusing with [`NOT_AVAILABLE`] when nothing relevant
//!   was retrieved.
//!
//! [`RagPipeline`] wires the stages together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ragdeck::{
//!     Document, ExtractiveModel, FixedSizeChunker, HashEmbeddingProvider,
//!     InMemoryVectorStore, RagConfig, RagPipeline,
//! };
//!
//! # async fn run() -> ragdeck::Result<()> {
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chunker(Arc::new(FixedSizeChunker::new(512, 100)))
//!     .language_model(Arc::new(ExtractiveModel))
//!     .build()?;
//!
//! pipeline.create_collection("docs").await?;
//! pipeline
//!     .ingest("docs", &Document::new("rust", "Rust is a systems programming language."))
//!     .await?;
//! let answer = pipeline.ask("docs", "What is Rust?").await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature  | Enables |
//! |----------|---------|
//! | `web`    | `WebLoader` over `reqwest` (default) |
//! | `openai` | OpenAI-compatible embeddings and chat |
//! | `qdrant` | Qdrant vector store |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod html;
pub mod inmemory;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod responder;
pub mod retry;
pub mod similarity;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{
    Chunker, FixedSizeChunker, MarkdownChunker, RecursiveChunker, WordChunker, reassemble,
    reassemble_words,
};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Answer, Chunk, Document, Record, SearchResult};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use llm::{ExtractiveModel, LanguageModel, MockLanguageModel, Prompt};
#[cfg(feature = "web")]
pub use loader::WebLoader;
pub use loader::{FileLoader, LoadFailure, LoadReport, Loader, SourceLoader};
pub use pipeline::{IngestFailure, IngestReport, RagPipeline, RagPipelineBuilder};
pub use responder::{NOT_AVAILABLE, PromptTemplate, Responder};
pub use retry::RetryConfig;
pub use similarity::cosine_similarity;
pub use vectorstore::VectorStore;
