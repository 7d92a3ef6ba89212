//! Configuration for the RAG pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryConfig;

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size, in the chunker's unit (characters or words).
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in the chunker's unit.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Maximum number of texts sent to the embedding provider per request.
    pub embed_batch_size: usize,
    /// Maximum number of documents ingested concurrently.
    pub ingest_concurrency: usize,
    /// Timeout applied to every fetch, embedding and generation call, in seconds.
    pub request_timeout_secs: u64,
    /// Budget for the context block handed to the language model, in characters.
    pub max_context_chars: usize,
    /// Retry policy for transient fetch and embedding failures.
    pub retry: RetryConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 100,
            top_k: 4,
            similarity_threshold: 0.0,
            embed_batch_size: 32,
            ingest_concurrency: 4,
            request_timeout_secs: 30,
            max_context_chars: 6_000,
            retry: RetryConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.ingest_concurrency == 0 {
            return Err(RagError::ConfigError(
                "ingest_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::ConfigError(format!(
                "similarity_threshold ({}) must be within [-1, 1]",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many documents may be ingested concurrently.
    pub fn ingest_concurrency(mut self, concurrency: usize) -> Self {
        self.config.ingest_concurrency = concurrency;
        self
    }

    /// Set the per-request timeout for external calls.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the context budget handed to the language model.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `embed_batch_size`, `ingest_concurrency` or the timeout is zero
    /// - `similarity_threshold` is outside `[-1, 1]`
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
