//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{Record, SearchResult};
use crate::error::Result;

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`Record`]s and support
/// upserting, deleting, and searching by vector similarity. All vectors in one
/// collection share the dimensionality the collection was created with.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &records).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists with the same
    /// dimensionality.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Upsert records into a collection. Records must have embeddings set.
    ///
    /// Records are keyed by chunk ID: re-adding an ID replaces the stored
    /// record, so adding the same chunk twice leaves the collection unchanged.
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()>;

    /// Delete records by their IDs from a collection.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Make `records` the complete set of records stored for `document_id`.
    ///
    /// Records are upserted as by [`upsert`](Self::upsert), and any earlier
    /// record of the same document whose ID is not in `records` is removed,
    /// so a document that shrinks leaves no stale chunks behind. An empty
    /// `records` removes the document entirely.
    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: &[Record],
    ) -> Result<()>;

    /// Search for the `top_k` most similar records to the given embedding.
    ///
    /// Returns at most `top_k` results ordered by descending similarity score.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Number of records stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}
