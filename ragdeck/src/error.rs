//! Error types for the `ragdeck` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A source could not be fetched or was malformed.
    #[error("Fetch error ({locator}): {message}")]
    FetchError {
        /// The locator (URL or path) that failed.
        locator: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the fetch may succeed.
        transient: bool,
    },

    /// The splitter was configured with invalid parameters.
    #[error("Split error: {0}")]
    SplitError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the request may succeed.
        transient: bool,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not have the dimensionality of its collection.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality of the collection.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// The language model call failed.
    #[error("Generation error ({model}): {message}")]
    GenerationError {
        /// The model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the request may succeed.
        transient: bool,
    },

    /// A call to an external service did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An I/O error, e.g. while reading or writing a store snapshot.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A serialization error, e.g. while decoding a store snapshot.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the operation that produced this error may succeed on retry.
    ///
    /// Timeouts and fetch, embedding or generation failures flagged as
    /// transient are retryable. Everything else (bad input, bad
    /// configuration, dimension mismatches) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::FetchError { transient, .. }
            | RagError::EmbeddingError { transient, .. }
            | RagError::GenerationError { transient, .. } => *transient,
            RagError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
