//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by
//! plain collections protected by a `tokio::sync::RwLock`. Search is an exact
//! linear scan. The whole store can be written to and read back from a JSON
//! snapshot, which is how the CLI persists an index between runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Record, SearchResult};
use crate::error::{RagError, Result};
use crate::similarity::cosine_similarity;
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

/// One named collection: records in insertion order plus an ID index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    records: Vec<Record>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Collection {
    fn new(dimensions: usize) -> Self {
        Self { dimensions, records: Vec::new(), index: HashMap::new() }
    }

    fn reindex(&mut self) {
        self.index =
            self.records.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(RagError::DimensionMismatch { expected: self.dimensions, actual });
        }
        Ok(())
    }

    fn check_batch(&self, records: &[Record]) -> Result<()> {
        records.iter().try_for_each(|record| self.check_dimensions(record.embedding.len()))
    }

    /// Insert or overwrite `records`; callers validate the batch first.
    fn apply(&mut self, records: &[Record]) {
        for record in records {
            match self.index.get(&record.id) {
                Some(&position) => self.records[position] = record.clone(),
                None => {
                    self.index.insert(record.id.clone(), self.records.len());
                    self.records.push(record.clone());
                }
            }
        }
    }
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections map a name to records kept in insertion order. Re-adding a
/// record ID overwrites it in place, preserving its original position; search
/// ties are broken by that position. All operations are async-safe via
/// `tokio::sync::RwLock`, and `upsert` validates a whole batch before
/// applying it under a single write lock, so concurrent searches never see a
/// partially-applied batch.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

/// On-disk representation of an [`InMemoryVectorStore`].
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    collections: BTreeMap<String, Collection>,
}

const SNAPSHOT_VERSION: u32 = 1;

fn missing(collection: &str) -> RagError {
    RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("collection '{collection}' does not exist"),
    }
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all collections, sorted.
    pub async fn collection_names(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }

    /// Dimensionality of a collection, if it exists.
    pub async fn dimensions(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(|c| c.dimensions)
    }

    /// Write every collection to a JSON snapshot at `path`.
    ///
    /// The snapshot is written to a sibling temporary file first and then
    /// renamed over `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let collections = self.collections.read().await;
            let snapshot = Snapshot { version: SNAPSHOT_VERSION, collections: collections.clone() };
            serde_json::to_vec(&snapshot)?
        };

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "saved vector store snapshot");
        Ok(())
    }

    /// Load a store from a JSON snapshot written by [`save`](Self::save).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("unsupported snapshot version {}", snapshot.version),
            });
        }

        let mut collections = snapshot.collections;
        for collection in collections.values_mut() {
            collection.reindex();
        }

        debug!(path = %path.display(), collections = collections.len(), "loaded vector store snapshot");
        Ok(Self { collections: RwLock::new(collections) })
    }

    /// Load a snapshot if `path` exists, otherwise start empty.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match tokio::fs::try_exists(path.as_ref()).await? {
            true => Self::load(path).await,
            false => Ok(Self::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) => existing.check_dimensions(dimensions),
            None => {
                collections.insert(name.to_string(), Collection::new(dimensions));
                debug!(collection = name, dimensions, "created in-memory collection");
                Ok(())
            }
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.check_batch(records)?;
        store.apply(records);

        debug!(collection, count = records.len(), total = store.records.len(), "upserted records");
        Ok(())
    }

    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: &[Record],
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.check_batch(records)?;

        let keep: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let before = store.records.len();
        store.records.retain(|r| r.document_id != document_id || keep.contains(r.id.as_str()));
        let removed = before - store.records.len();
        if removed > 0 {
            store.reindex();
        }
        store.apply(records);

        debug!(collection, document_id, count = records.len(), removed, "replaced document records");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        let before = store.records.len();
        store.records.retain(|r| !ids.contains(&r.id.as_str()));
        if store.records.len() != before {
            store.reindex();
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        store.check_dimensions(embedding.len())?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Record)> = store
            .records
            .iter()
            .map(|record| {
                let score = cosine_similarity(&record.embedding, embedding);
                // Overflowing magnitudes can yield NaN; such records rank last.
                (if score.is_nan() { f32::NEG_INFINITY } else { score }, record)
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchResult { chunk: record.clone(), score })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.records.len()).ok_or_else(|| missing(collection))
    }
}
