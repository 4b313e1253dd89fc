//! Document indexing: extraction → chunking → embedding → storage.
//!
//! The [`Indexer`] owns one collection of a [`VectorStore`]. For every document it
//! extracts text, cuts it into overlapping chunks, embeds all chunks of the
//! document in a single provider call and upserts the resulting records in one
//! store call. Record ids are derived from the document's file name and the chunk
//! position (`<file name>_chunk_<n>`), so indexing the same document again overwrites
//! its records instead of duplicating them. When a document shrinks, records past
//! its new last chunk are pruned.
//!
//! ## Corpus indexing
//!
//! [`Indexer::index_corpus`] walks a directory (non-recursively, in file-name
//! order) and indexes every file with a supported extension. A failing document
//! is logged and counted; it never stops the rest of the corpus.
//!
//! ## Example
//!
//! ```rust,no_run
//! use docsearch_embed::{EmbedConfig, create_provider};
//! use docsearch_retriever::indexing::{Indexer, IndexerConfig};
//! use docsearch_retriever::storage::sqlite_store::SqliteStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(SqliteStore::open(Path::new("./chroma_db")).await?);
//! let embedder = create_provider(EmbedConfig::default()).await?;
//!
//! let indexer = Indexer::new(store, embedder, IndexerConfig::default()).await?;
//! let report = indexer.index_corpus(Path::new("source")).await?;
//! println!("processed {}, failed {}", report.processed, report.failed);
//! # Ok(())
//! # }
//! ```

use crate::extraction::{DocumentExtractor, ExtractionError, TextExtractor, extension_of};
use crate::storage::{Collection, Metadata, Record, StoreError, VectorStore};
use docsearch_context::text::{ChunkingConfig, ChunkingError, chunk_document};
use docsearch_embed::{EmbedError, EmbeddingProvider};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "pdf_documents";

/// Description stored in the metadata of collections the indexer creates.
pub const COLLECTION_DESCRIPTION: &str = "PDF document embeddings";

/// A document read from disk, identified by its file name.
///
/// The full name keeps `notes.md` and `notes.txt` (or `a.pdf` and `a.PDF`) in one
/// directory apart.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    pub path: PathBuf,
    pub content: Vec<u8>,
    /// blake3 hash of `content`, hex encoded
    pub content_hash: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let content_hash = hex::encode(blake3::hash(&content).as_bytes());

        Self {
            id,
            path,
            content,
            content_hash,
        }
    }

    pub async fn read(path: &Path) -> Result<Self, ExtractionError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractionError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(path, content))
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }

    /// Record id of the chunk at `index`.
    pub fn chunk_id(&self, index: usize) -> String {
        format!("{}_chunk_{}", self.id, index)
    }
}

/// Metadata stored with every chunk record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub filename: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub document_id: String,
    pub content_hash: String,
}

impl ChunkMetadata {
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!(self.source));
        metadata.insert("filename".into(), json!(self.filename));
        metadata.insert("chunk_index".into(), json!(self.chunk_index));
        metadata.insert("total_chunks".into(), json!(self.total_chunks));
        metadata.insert("document_id".into(), json!(self.document_id));
        metadata.insert("content_hash".into(), json!(self.content_hash));
        metadata
    }
}

/// Configuration for [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub collection_name: String,
    pub chunking: ChunkingConfig,
    /// Lowercase file extensions picked up by [`Indexer::index_corpus`]
    pub extensions: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION.to_string(),
            chunking: ChunkingConfig::default(),
            extensions: vec!["pdf".into(), "txt".into(), "md".into()],
        }
    }
}

impl IndexerConfig {
    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ChunkingError),

    #[error("embedding provider returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("failed to list documents: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of indexing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexedDocument {
    pub chunks_written: usize,
}

/// Outcome of indexing a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusReport {
    pub processed: usize,
    pub failed: usize,
    /// Documents that produced no text
    pub skipped: usize,
    pub chunks_written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub collection_name: String,
    pub document_count: usize,
}

/// Writes documents into one collection of a vector store.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    config: IndexerConfig,
}

impl Indexer {
    /// Validates the configuration and makes sure the collection exists.
    pub async fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: IndexerConfig,
    ) -> Result<Self, IndexError> {
        config.chunking.validate()?;

        let indexer = Self {
            store,
            embedder,
            extractor: Arc::new(DocumentExtractor::default()),
            config,
        };
        indexer.ensure_collection().await?;
        Ok(indexer)
    }

    /// Replace the extractor, e.g. to support additional formats.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Metadata written to collections created by the indexer.
    pub fn collection_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("description".into(), json!(COLLECTION_DESCRIPTION));
        metadata
    }

    pub async fn ensure_collection(&self) -> Result<Collection, IndexError> {
        Ok(self
            .store
            .get_or_create_collection(&self.config.collection_name, Self::collection_metadata())
            .await?)
    }

    /// Index one document with the configured chunking.
    pub async fn index_document(&self, doc: &SourceDocument) -> Result<IndexedDocument, IndexError> {
        self.index_document_with(doc, &self.config.chunking).await
    }

    /// Index one document with explicit chunking parameters.
    pub async fn index_document_with(
        &self,
        doc: &SourceDocument,
        chunking: &ChunkingConfig,
    ) -> Result<IndexedDocument, IndexError> {
        chunking.validate()?;

        let collection = &self.config.collection_name;
        let text = self.extract(doc).await?;
        if text.trim().is_empty() {
            tracing::warn!("No text extracted from {}", doc.filename());
            // Chunks from an earlier, non-empty version must not stay searchable
            let pruned = self.store.truncate_document(collection, &doc.id, 0).await?;
            if pruned > 0 {
                tracing::debug!("Pruned {} stale chunks of {}", pruned, doc.id);
            }
            return Ok(IndexedDocument { chunks_written: 0 });
        }

        let chunks = chunk_document(&text, chunking)?;
        tracing::debug!("Split {} into {} chunks", doc.filename(), chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_texts(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let source = doc.path.to_string_lossy().into_owned();
        let filename = doc.filename();
        let records: Vec<Record> = chunks
            .into_iter()
            .zip(embeddings.embeddings)
            .map(|(chunk, embedding)| {
                let metadata = ChunkMetadata {
                    source: source.clone(),
                    filename: filename.clone(),
                    chunk_index: chunk.index,
                    total_chunks: chunk.total_in_document,
                    document_id: doc.id.clone(),
                    content_hash: doc.content_hash.clone(),
                };
                Record {
                    id: doc.chunk_id(chunk.index),
                    document_id: doc.id.clone(),
                    chunk_index: chunk.index,
                    document: chunk.text,
                    embedding,
                    metadata: metadata.to_metadata(),
                }
            })
            .collect();

        let written = self.store.upsert(collection, records).await?;

        let pruned = self
            .store
            .truncate_document(collection, &doc.id, written)
            .await?;
        if pruned > 0 {
            tracing::debug!("Pruned {} stale chunks of {}", pruned, doc.id);
        }

        tracing::info!("Embedded {} chunks from {}", written, filename);
        Ok(IndexedDocument {
            chunks_written: written,
        })
    }

    async fn extract(&self, doc: &SourceDocument) -> Result<String, IndexError> {
        let extractor = Arc::clone(&self.extractor);
        let path = doc.path.clone();
        let content = doc.content.clone();

        let text = tokio::task::spawn_blocking(move || extractor.extract(&path, &content)).await??;
        Ok(text)
    }

    /// Index every supported file directly inside `source_dir`.
    pub async fn index_corpus(&self, source_dir: &Path) -> Result<CorpusReport, IndexError> {
        let mut report = CorpusReport::default();

        if !tokio::fs::try_exists(source_dir).await.unwrap_or(false) {
            tracing::warn!("Source directory {} does not exist", source_dir.display());
            return Ok(report);
        }

        let files = self.list_documents(source_dir).await?;
        if files.is_empty() {
            tracing::warn!("No documents found in {}", source_dir.display());
            return Ok(report);
        }
        tracing::info!("Found {} documents to process", files.len());

        for path in files {
            let outcome = match SourceDocument::read(&path).await {
                Ok(doc) => self.index_document(&doc).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok(indexed) if indexed.chunks_written == 0 => report.skipped += 1,
                Ok(indexed) => {
                    report.processed += 1;
                    report.chunks_written += indexed.chunks_written;
                }
                Err(e) => {
                    tracing::error!("Error processing {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Supported files directly inside `dir`, sorted by file name.
    async fn list_documents(&self, dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let supported = extension_of(&path)
                .map(|ext| self.config.extensions.iter().any(|e| *e == ext))
                .unwrap_or(false);
            if supported {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Delete every record by dropping and recreating the collection.
    pub async fn reset_index(&self) -> Result<(), IndexError> {
        let name = &self.config.collection_name;
        if self.store.delete_collection(name).await? {
            tracing::info!("Deleted collection '{}'", name);
        }
        self.ensure_collection().await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats, IndexError> {
        let document_count = self.store.count(&self.config.collection_name).await?;
        Ok(IndexStats {
            collection_name: self.config.collection_name.clone(),
            document_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite_store::SqliteStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use docsearch_embed::{EmbeddingResult, HashingProvider};
    use half::f16;
    use tracing_test::traced_test;

    async fn indexer() -> Result<(Arc<SqliteStore>, Indexer)> {
        let store = Arc::new(SqliteStore::open_memory().await?);
        let indexer = Indexer::new(
            store.clone(),
            Arc::new(HashingProvider::new(64)),
            IndexerConfig::default(),
        )
        .await?;
        Ok((store, indexer))
    }

    fn text_doc(name: &str, text: &str) -> SourceDocument {
        SourceDocument::new(PathBuf::from("source").join(name), text.as_bytes().to_vec())
    }

    #[test]
    fn test_source_document_identity() {
        let doc = text_doc("annual report.txt", "hello");
        assert_eq!(doc.id, "annual report.txt");
        assert_eq!(doc.filename(), "annual report.txt");
        assert_eq!(doc.chunk_id(3), "annual report.txt_chunk_3");
        assert_ne!(text_doc("annual report.md", "hello").id, doc.id);
        assert_ne!(text_doc("a.PDF", "x").id, text_doc("a.pdf", "x").id);
        assert_eq!(doc.content_hash.len(), 64);
        assert_eq!(doc.content_hash, text_doc("other.txt", "hello").content_hash);
    }

    #[test]
    fn test_config_extensions_normalized() {
        let config = IndexerConfig::default().with_extensions([".PDF", "Md"]);
        assert_eq!(config.extensions, vec!["pdf", "md"]);
    }

    #[tokio::test]
    async fn test_new_creates_collection_with_description() -> Result<()> {
        let (store, _indexer) = indexer().await?;
        let collection = store
            .get_collection(DEFAULT_COLLECTION)
            .await?
            .expect("collection created");
        assert_eq!(collection.metadata["description"], json!(COLLECTION_DESCRIPTION));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_chunking_rejected() -> Result<()> {
        let store = Arc::new(SqliteStore::open_memory().await?);
        let result = Indexer::new(
            store,
            Arc::new(HashingProvider::new(8)),
            IndexerConfig::default().with_chunking(ChunkingConfig::new(100, 100)),
        )
        .await;
        assert!(matches!(result, Err(IndexError::Configuration(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_three_chunk_document_then_reset() -> Result<()> {
        let (_store, indexer) = indexer().await?;
        let doc = text_doc("long.txt", &"a".repeat(2500));

        let indexed = indexer.index_document(&doc).await?;
        assert_eq!(indexed.chunks_written, 3);
        assert_eq!(indexer.stats().await?.document_count, 3);

        indexer.reset_index().await?;
        assert_eq!(indexer.stats().await?.document_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_reindexing_is_idempotent() -> Result<()> {
        let (store, indexer) = indexer().await?;
        let doc = text_doc("notes.txt", &"Sentence number one. ".repeat(120));

        let first = indexer.index_document(&doc).await?;
        let count = indexer.stats().await?.document_count;
        let second = indexer.index_document(&doc).await?;

        assert_eq!(first, second);
        assert_eq!(indexer.stats().await?.document_count, count);

        let probe = HashingProvider::new(64).embed_text("Sentence").await?;
        let batch = store
            .query(DEFAULT_COLLECTION, &[probe], 100, Default::default())
            .await?;
        let mut ids = batch.ids[0].clone();
        ids.sort();
        let mut expected: Vec<String> = (0..count).map(|i| doc.chunk_id(i)).collect();
        expected.sort();
        assert_eq!(ids, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_shrinking_document_prunes_stale_chunks() -> Result<()> {
        let (_store, indexer) = indexer().await?;

        indexer
            .index_document(&text_doc("doc.txt", &"b".repeat(2500)))
            .await?;
        assert_eq!(indexer.stats().await?.document_count, 3);

        indexer
            .index_document(&text_doc("doc.txt", "now it is short"))
            .await?;
        assert_eq!(indexer.stats().await?.document_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_chunk_metadata() -> Result<()> {
        let (store, indexer) = indexer().await?;
        let doc = text_doc("meta.txt", "Short and sweet.");
        indexer.index_document(&doc).await?;

        let probe = HashingProvider::new(64).embed_text("sweet").await?;
        let batch = store
            .query(DEFAULT_COLLECTION, &[probe], 1, Default::default())
            .await?;
        let metadata = &batch.metadatas.unwrap()[0][0];

        assert_eq!(metadata["filename"], json!("meta.txt"));
        assert_eq!(metadata["chunk_index"], json!(0));
        assert_eq!(metadata["total_chunks"], json!(1));
        assert_eq!(metadata["document_id"], json!("meta.txt"));
        assert_eq!(metadata["content_hash"], json!(doc.content_hash));
        assert!(metadata["source"].as_str().unwrap().ends_with("meta.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() -> Result<()> {
        let (_store, indexer) = indexer().await?;
        let indexed = indexer
            .index_document(&text_doc("blank.txt", "   \n\n  "))
            .await?;
        assert_eq!(indexed.chunks_written, 0);
        assert_eq!(indexer.stats().await?.document_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_emptied_document_drops_old_chunks() -> Result<()> {
        let (_store, indexer) = indexer().await?;

        indexer
            .index_document(&text_doc("doc.txt", &"x".repeat(2500)))
            .await?;
        assert_eq!(indexer.stats().await?.document_count, 3);

        let indexed = indexer.index_document(&text_doc("doc.txt", "   ")).await?;
        assert_eq!(indexed.chunks_written, 0);
        assert_eq!(indexer.stats().await?.document_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_stem_documents_keep_separate_records() -> Result<()> {
        let (_store, indexer) = indexer().await?;

        indexer
            .index_document(&text_doc("notes.md", &"m".repeat(2500)))
            .await?;
        indexer
            .index_document(&text_doc("notes.txt", "A short text version."))
            .await?;

        // The shorter notes.txt must not prune the chunks of notes.md
        assert_eq!(indexer.stats().await?.document_count, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_per_call_chunking() -> Result<()> {
        let (_store, indexer) = indexer().await?;
        let doc = text_doc("doc.txt", &"c".repeat(1000));

        let indexed = indexer
            .index_document_with(&doc, &ChunkingConfig::new(400, 50))
            .await?;
        assert_eq!(indexed.chunks_written, 3);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_document_is_logged() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf at all")?;
        std::fs::write(dir.path().join("fine.txt"), b"Readable text.")?;

        let (_store, indexer) = indexer().await?;
        let report = indexer.index_corpus(dir.path()).await?;

        assert_eq!((report.processed, report.failed), (1, 1));
        assert!(logs_contain("Error processing"));
        assert!(logs_contain("broken.pdf"));
        Ok(())
    }

    struct ShortChangingProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortChangingProvider {
        async fn embed_text(&self, _text: &str) -> docsearch_embed::Result<Vec<f16>> {
            Ok(vec![f16::ONE; 4])
        }

        async fn embed_texts(&self, texts: &[String]) -> docsearch_embed::Result<EmbeddingResult> {
            Ok(EmbeddingResult::new(vec![vec![f16::ONE; 4]; texts.len().saturating_sub(1)]))
        }

        fn embedding_dimension(&self) -> usize {
            4
        }

        fn provider_name(&self) -> &str {
            "short-changing"
        }
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch() -> Result<()> {
        let store = Arc::new(SqliteStore::open_memory().await?);
        let indexer = Indexer::new(
            store,
            Arc::new(ShortChangingProvider),
            IndexerConfig::default(),
        )
        .await?;

        let err = indexer
            .index_document(&text_doc("doc.txt", &"d".repeat(2500)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::EmbeddingCountMismatch {
                expected: 3,
                actual: 2
            }
        ));
        Ok(())
    }
}
