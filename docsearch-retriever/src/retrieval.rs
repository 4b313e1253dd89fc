//! Query-time nearest-neighbour retrieval.

use crate::storage::{Include, Metadata, QueryBatch, StoreError, VectorStore};
use docsearch_embed::{EmbedError, EmbeddingProvider};
use serde::Serialize;
use std::sync::Arc;

/// Number of results returned when the caller does not ask for a count.
pub const DEFAULT_N_RESULTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The collection has not been created yet. Distinct from a query that
    /// simply matched nothing.
    #[error("collection '{collection}' not found; index some documents first")]
    NotReady { collection: String },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Flat result of a single query, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub documents: Vec<String>,
    /// `None` when metadata was not requested
    pub metadatas: Option<Vec<Metadata>>,
    pub distances: Vec<f32>,
    pub ids: Vec<String>,
}

impl QueryResult {
    /// Take the first query's lists out of a batched store response.
    fn from_batch(batch: QueryBatch, include_metadata: bool) -> Self {
        fn first<T>(lists: Option<Vec<Vec<T>>>) -> Vec<T> {
            lists
                .and_then(|lists| lists.into_iter().next())
                .unwrap_or_default()
        }

        Self {
            ids: first(Some(batch.ids)),
            documents: first(batch.documents),
            distances: first(batch.distances),
            metadatas: include_metadata.then(|| first(batch.metadatas)),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Answers text queries against one collection.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection_name: String,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection_name: collection_name.into(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Whether the collection exists.
    pub async fn is_ready(&self) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get_collection(&self.collection_name)
            .await?
            .is_some())
    }

    /// Number of records in the collection.
    pub async fn count(&self) -> Result<usize, QueryError> {
        match self.store.count(&self.collection_name).await {
            Err(StoreError::CollectionNotFound(_)) => Err(self.not_ready()),
            other => Ok(other?),
        }
    }

    /// Return up to `n_results` chunks closest to `text`. `n_results` below one is
    /// treated as one.
    pub async fn query(
        &self,
        text: &str,
        n_results: usize,
        include_metadata: bool,
    ) -> Result<QueryResult, QueryError> {
        if !self.is_ready().await? {
            return Err(self.not_ready());
        }

        let n_results = n_results.max(1);
        let embedding = self.embedder.embed_text(text).await?;

        let batch = self
            .store
            .query(
                &self.collection_name,
                &[embedding],
                n_results,
                Include {
                    metadatas: include_metadata,
                },
            )
            .await;

        let batch = match batch {
            // Deleted between the readiness check and the search
            Err(StoreError::CollectionNotFound(_)) => return Err(self.not_ready()),
            other => other?,
        };

        let result = QueryResult::from_batch(batch, include_metadata);
        tracing::debug!(
            "Query matched {} chunks in '{}'",
            result.len(),
            self.collection_name
        );
        Ok(result)
    }

    fn not_ready(&self) -> QueryError {
        QueryError::NotReady {
            collection: self.collection_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::{Indexer, IndexerConfig, SourceDocument};
    use crate::storage::sqlite_store::SqliteStore;
    use anyhow::Result;
    use docsearch_embed::HashingProvider;

    async fn setup() -> Result<(Arc<SqliteStore>, Arc<HashingProvider>)> {
        Ok((
            Arc::new(SqliteStore::open_memory().await?),
            Arc::new(HashingProvider::new(128)),
        ))
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_ready() -> Result<()> {
        let (store, embedder) = setup().await?;
        let retriever = Retriever::new(store, embedder, "pdf_documents");

        assert!(!retriever.is_ready().await?);
        let err = retriever.query("anything", 5, true).await.unwrap_err();
        assert!(matches!(err, QueryError::NotReady { .. }));
        assert!(matches!(
            retriever.count().await,
            Err(QueryError::NotReady { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_collection_returns_nothing() -> Result<()> {
        let (store, embedder) = setup().await?;
        Indexer::new(store.clone(), embedder.clone(), IndexerConfig::default()).await?;

        let retriever = Retriever::new(store, embedder, "pdf_documents");
        let result = retriever.query("anything", 5, true).await?;

        assert!(result.is_empty());
        assert_eq!(result.metadatas, Some(vec![]));
        assert!(result.distances.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_results_sorted_and_bounded() -> Result<()> {
        let (store, embedder) = setup().await?;
        let indexer = Indexer::new(store.clone(), embedder.clone(), IndexerConfig::default()).await?;
        for (name, text) in [
            ("rust.txt", "Rust ownership and borrowing rules."),
            ("cake.txt", "Chocolate cake needs cocoa and sugar."),
            ("sql.txt", "SQLite stores rows in B-trees."),
        ] {
            indexer
                .index_document(&SourceDocument::new(name, text.as_bytes().to_vec()))
                .await?;
        }

        let retriever = Retriever::new(store, embedder, "pdf_documents");

        let result = retriever.query("rust ownership borrowing", 2, true).await?;
        assert_eq!(result.len(), 2);
        assert_eq!(result.ids[0], "rust.txt_chunk_0");
        assert!(result.distances.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(result.documents[0], "Rust ownership and borrowing rules.");
        assert_eq!(result.metadatas.as_ref().map(Vec::len), Some(2));

        let everything = retriever.query("rust", 50, false).await?;
        assert_eq!(everything.len(), 3);
        assert!(everything.metadatas.is_none());

        let clamped = retriever.query("rust", 0, true).await?;
        assert_eq!(clamped.len(), 1);
        Ok(())
    }
}
