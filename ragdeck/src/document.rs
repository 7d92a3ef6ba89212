//! Data types for documents, chunks, search results and answers.

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
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata and no source URI.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Attach a source URI, also recorded as the `source` metadata field.
    pub fn with_source(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        self.metadata.insert("source".to_string(), uri.clone());
        self.source_uri = Some(uri);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    pub embedding: Vec<f32>,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// The position of this chunk within its document, if recorded.
    pub fn index(&self) -> Option<usize> {
        self.metadata.get("chunk_index").and_then(|i| i.parse().ok())
    }

    /// The source URI of the parent document, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// A [`Chunk`] whose embedding has been attached: the unit a vector store persists.
pub type Record = Chunk;

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Text produced by the responder, with the chunks it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// The retrieved chunks supplied to the model as context, best first.
    pub sources: Vec<SearchResult>,
    /// `false` when the text is the not-available reply, whether because
    /// nothing was retrieved or because the model declined.
    pub grounded: bool,
}
