//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant only accepts unsigned integers and UUIDs as point IDs, so chunk IDs
//! are mapped to deterministic UUIDv5 values and the original ID travels in
//! the point payload. Re-upserting a chunk therefore overwrites its point.
//! Replacing a document also deletes its points by a `document_id` payload
//! filter, which is not atomic with the upsert.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragdeck::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("docs", 384).await?;
//! store.upsert("docs", &records).await?;
//! let results = store.search("docs", &query_embedding, 5).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;
use uuid::Uuid;

use crate::document::{Chunk, Record, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Wraps a [`qdrant_client::Qdrant`] client and maps collections to Qdrant
/// collections with cosine distance. Chunk text, document ID and metadata are
/// stored as Qdrant payload.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store with default URL (`http://localhost:6334`).
    pub fn default_url() -> Result<Self> {
        Self::new("http://localhost:6334")
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    /// The Qdrant point ID used for a chunk ID.
    pub fn point_id(chunk_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::VectorStoreError { backend: BACKEND.to_string(), message: e.to_string() }
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Vector size of an existing collection, or `None` if it does not exist.
    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(None);
        }
        let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
        let size = info
            .result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config)
            .and_then(|config| match config {
                VectorsConfigKind::Params(params) => Some(params.size as usize),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        size.map(Some).ok_or_else(|| RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("collection '{name}' does not use a single unnamed vector"),
        })
    }

    async fn require_dimensions(&self, name: &str) -> Result<usize> {
        self.collection_dimensions(name).await?.ok_or_else(|| RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("collection '{name}' does not exist"),
        })
    }

    fn payload(record: &Record) -> Result<Payload> {
        let mut payload_map = serde_json::Map::new();
        payload_map.insert("chunk_id".to_string(), serde_json::Value::String(record.id.clone()));
        payload_map.insert("text".to_string(), serde_json::Value::String(record.text.clone()));
        payload_map.insert(
            "document_id".to_string(),
            serde_json::Value::String(record.document_id.clone()),
        );
        let metadata_obj: serde_json::Map<String, serde_json::Value> = record
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        payload_map.insert("metadata".to_string(), serde_json::Value::Object(metadata_obj));

        Payload::try_from(serde_json::Value::Object(payload_map)).map_err(|e| {
            RagError::VectorStoreError { backend: BACKEND.to_string(), message: e.to_string() }
        })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if let Some(existing) = self.collection_dimensions(name).await? {
            if existing != dimensions {
                return Err(RagError::DimensionMismatch { expected: existing, actual: dimensions });
            }
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let dimensions = self.require_dimensions(collection).await?;
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimensions) {
            return Err(RagError::DimensionMismatch { expected: dimensions, actual: bad.embedding.len() });
        }

        let points = records
            .iter()
            .map(|record| {
                Ok(PointStruct::new(
                    Self::point_id(&record.id).to_string(),
                    record.embedding.clone(),
                    Self::payload(record)?,
                ))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = records.len(), "upserted records to qdrant");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> =
            ids.iter().map(|id| Self::point_id(id).to_string().into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: &[Record],
    ) -> Result<()> {
        self.upsert(collection, records).await?;

        // Remove the document's points that the new records did not overwrite.
        let mut stale = Filter::must([Condition::matches("document_id", document_id.to_string())]);
        if !records.is_empty() {
            let kept: Vec<PointId> =
                records.iter().map(|r| Self::point_id(&r.id).to_string().into()).collect();
            stale.must_not = vec![Condition::has_id(kept)];
        }

        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(stale).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, document_id, count = records.len(), "replaced document points in qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let dimensions = self.require_dimensions(collection).await?;
        if embedding.len() != dimensions {
            return Err(RagError::DimensionMismatch { expected: dimensions, actual: embedding.len() });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let string = |key: &str| {
                    scored.payload.get(key).and_then(Self::extract_string).unwrap_or_default()
                };
                let id = string("chunk_id");
                let text = string("text");
                let document_id = string("document_id");

                let metadata: HashMap<String, String> = scored
                    .payload
                    .get("metadata")
                    .and_then(|v| match &v.kind {
                        Some(Kind::StructValue(s)) => Some(
                            s.fields
                                .iter()
                                .filter_map(|(k, v)| {
                                    Self::extract_string(v).map(|s| (k.clone(), s))
                                })
                                .collect(),
                        ),
                        _ => None,
                    })
                    .unwrap_or_default();

                SearchResult {
                    chunk: Chunk { id, text, embedding: vec![], metadata, document_id },
                    score: scored.score,
                }
            })
            .collect();

        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
