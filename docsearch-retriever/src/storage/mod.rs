//! Storage abstraction layer for docsearch-retriever
//!
//! The indexer and retriever only ever talk to a [`VectorStore`]: a set of named
//! collections, each holding [`Record`]s (chunk text, `f16` embedding and JSON
//! metadata) that can be upserted, counted, pruned and searched by nearest
//! neighbour. [`sqlite_store::SqliteStore`] is the shipped implementation.
//!
//! ## Architecture
//!
//! ```text
//! Indexer ──┐
//!           ├─ VectorStore ── SqliteStore (collections + records tables)
//! Retriever ┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use serde::Serialize;

pub mod sqlite_store;

/// JSON object attached to collections and records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Collection metadata key selecting the distance metric.
pub const DISTANCE_METADATA_KEY: &str = "hnsw:space";

/// One stored chunk. `id` is unique within its collection; upserting an existing
/// id replaces the record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    /// Identifier of the source document the chunk came from
    pub document_id: String,
    /// Position of the chunk within its document, used for pruning
    pub chunk_index: usize,
    /// The chunk text
    pub document: String,
    pub embedding: Vec<f16>,
    pub metadata: Metadata,
}

/// A named container of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub name: String,
    pub metadata: Metadata,
    /// Embedding dimension, fixed by the first upsert
    pub dimension: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    /// Distance metric chosen through the `hnsw:space` metadata key.
    pub fn distance_metric(&self) -> DistanceMetric {
        DistanceMetric::from_metadata(&self.metadata)
    }
}

/// How query distances are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// `1 - cosine similarity`, in `[0, 2]`
    #[default]
    Cosine,
    /// Squared Euclidean distance
    SquaredL2,
}

impl DistanceMetric {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        match metadata
            .get(DISTANCE_METADATA_KEY)
            .and_then(|v| v.as_str())
        {
            Some("l2") => Self::SquaredL2,
            _ => Self::Cosine,
        }
    }

    pub fn distance(self, a: &[f16], b: &[f16]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::SquaredL2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x.to_f32() - y.to_f32();
                    d * d
                })
                .sum(),
        }
    }
}

/// Cosine similarity accumulated in `f32`; zero when either vector has no length.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Which optional fields a query should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Include {
    pub metadatas: bool,
}

impl Default for Include {
    fn default() -> Self {
        Self { metadatas: true }
    }
}

/// Nearest-neighbour results, one inner list per query embedding.
///
/// Mirrors the batched shape of common vector databases. Fields that were not
/// requested are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBatch {
    pub ids: Vec<Vec<String>>,
    pub documents: Option<Vec<Vec<String>>>,
    pub metadatas: Option<Vec<Vec<Metadata>>>,
    pub distances: Option<Vec<Vec<f32>>>,
}

/// Errors raised by vector stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("embedding dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Capability interface over a persistent vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the named collection, creating it with `metadata` when absent.
    /// Metadata of an existing collection is left unchanged.
    async fn get_or_create_collection(&self, name: &str, metadata: Metadata)
    -> StoreResult<Collection>;

    async fn get_collection(&self, name: &str) -> StoreResult<Option<Collection>>;

    /// Drop a collection and all its records. Returns whether it existed.
    async fn delete_collection(&self, name: &str) -> StoreResult<bool>;

    async fn list_collections(&self) -> StoreResult<Vec<Collection>>;

    /// Insert or replace records by id, atomically. Returns the number written.
    async fn upsert(&self, collection: &str, records: Vec<Record>) -> StoreResult<usize>;

    /// Delete records of `document_id` whose chunk index is `>= keep_chunks`.
    async fn truncate_document(
        &self,
        collection: &str,
        document_id: &str,
        keep_chunks: usize,
    ) -> StoreResult<usize>;

    /// Up to `n_results` nearest records per query embedding, nearest first.
    async fn query(
        &self,
        collection: &str,
        query_embeddings: &[Vec<f16>],
        n_results: usize,
        include: Include,
    ) -> StoreResult<QueryBatch>;

    async fn count(&self, collection: &str) -> StoreResult<usize>;

    /// Delete records by id. Returns the number removed.
    async fn delete(&self, collection: &str, ids: &[String]) -> StoreResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(values: &[f32]) -> Vec<f16> {
        values.iter().copied().map(f16::from_f32).collect()
    }

    #[test]
    fn test_cosine_similarity() {
        let a = v(&[1.0, 0.0, 0.0]);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-3);

        let b = v(&[0.0, 1.0, 0.0]);
        assert!(cosine_similarity(&a, &b).abs() < 1e-3);

        let c = v(&[-1.0, 0.0, 0.0]);
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 1e-3);

        assert_eq!(cosine_similarity(&a, &v(&[1.0, 0.0])), 0.0);
        assert_eq!(cosine_similarity(&a, &v(&[0.0, 0.0, 0.0])), 0.0);
    }

    #[test]
    fn test_distance_metric_from_metadata() {
        let mut metadata = Metadata::new();
        assert_eq!(DistanceMetric::from_metadata(&metadata), DistanceMetric::Cosine);

        metadata.insert(DISTANCE_METADATA_KEY.into(), json!("l2"));
        assert_eq!(DistanceMetric::from_metadata(&metadata), DistanceMetric::SquaredL2);

        metadata.insert(DISTANCE_METADATA_KEY.into(), json!("ip"));
        assert_eq!(DistanceMetric::from_metadata(&metadata), DistanceMetric::Cosine);
    }

    #[test]
    fn test_distances() {
        let a = v(&[1.0, 0.0]);
        let b = v(&[0.0, 1.0]);

        assert!((DistanceMetric::Cosine.distance(&a, &a)).abs() < 1e-3);
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-3);
        assert!((DistanceMetric::SquaredL2.distance(&a, &b) - 2.0).abs() < 1e-3);
    }
}
