//! docsearch-retriever: document indexing and nearest-neighbour retrieval
//!
//! Turns a folder of PDFs and text files into a searchable vector index and
//! answers text queries against it.
//!
//! ## Key Modules
//!
//! - **[`extraction`]**: PDF and plain-text extraction
//! - **[`indexing`]**: extraction → chunking → embedding → storage, per document and per corpus
//! - **[`retrieval`]**: query embedding and result shaping
//! - **[`storage`]**: the [`VectorStore`](storage::VectorStore) abstraction and its SQLite implementation
//!
//! ## Architecture
//!
//! ```text
//! Files → Extractor → Chunker → EmbeddingProvider → VectorStore
//!                                                       ↓
//!                      Query → EmbeddingProvider → Retriever → QueryResult
//! ```

pub mod extraction;
pub mod indexing;
pub mod retrieval;
pub mod storage;

pub use indexing::{CorpusReport, IndexError, IndexStats, IndexedDocument, Indexer, IndexerConfig, SourceDocument};
pub use retrieval::{QueryError, QueryResult, Retriever};
pub use storage::{StoreError, VectorStore, sqlite_store::SqliteStore};
