//! End-to-end tests for corpus indexing and retrieval against an on-disk store.
//!
//! Every test uses the offline hashing provider, so nothing is downloaded.

use anyhow::Result;
use docsearch_embed::HashingProvider;
use docsearch_retriever::indexing::{DEFAULT_COLLECTION, Indexer, IndexerConfig};
use docsearch_retriever::retrieval::{QueryError, Retriever};
use docsearch_retriever::storage::VectorStore;
use docsearch_retriever::storage::sqlite_store::SqliteStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write_corpus(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(
        dir.join("alpha.txt"),
        "Alpha particles are helium nuclei. They are stopped by paper.",
    )?;
    fs::write(
        dir.join("beta.md"),
        "# Beta decay\n\nBeta decay emits an electron or a positron.",
    )?;
    fs::write(dir.join("broken.pdf"), b"%PDF-1.4 this file is truncated")?;
    fs::write(dir.join("photo.png"), b"\x89PNG not a document")?;
    Ok(())
}

/// Test that one corrupt document does not stop the rest of the corpus
#[tokio::test]
async fn test_corpus_with_one_bad_document() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = temp_dir.path().join("source");
    write_corpus(&source)?;

    let store = Arc::new(SqliteStore::open(&temp_dir.path().join("db")).await?);
    let indexer = Indexer::new(
        store.clone(),
        Arc::new(HashingProvider::new(128)),
        IndexerConfig::default(),
    )
    .await?;

    let report = indexer.index_corpus(&source).await?;
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.chunks_written, 2);
    assert_eq!(indexer.stats().await?.document_count, 2);

    Ok(())
}

/// Test that empty documents are skipped rather than failed
#[tokio::test]
async fn test_empty_documents_are_skipped() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = temp_dir.path().join("source");
    fs::create_dir_all(&source)?;
    fs::write(source.join("empty.txt"), "   \n")?;
    fs::write(source.join("full.txt"), "Some actual content.")?;

    let store = Arc::new(SqliteStore::open_memory().await?);
    let indexer = Indexer::new(store, Arc::new(HashingProvider::new(32)), IndexerConfig::default()).await?;

    let report = indexer.index_corpus(&source).await?;
    assert_eq!((report.processed, report.failed, report.skipped), (1, 0, 1));
    Ok(())
}

/// Test that files sharing a stem are stored under distinct ids
#[tokio::test]
async fn test_same_stem_files_in_one_corpus() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = temp_dir.path().join("source");
    fs::create_dir_all(&source)?;
    fs::write(source.join("notes.md"), "# Notes\n\nMarkdown flavoured notes.")?;
    fs::write(source.join("notes.txt"), "Plain text notes.")?;

    let store = Arc::new(SqliteStore::open_memory().await?);
    let indexer = Indexer::new(store.clone(), Arc::new(HashingProvider::new(32)), IndexerConfig::default()).await?;

    let report = indexer.index_corpus(&source).await?;
    assert_eq!(report.processed, 2);
    assert_eq!(report.chunks_written, 2);
    assert_eq!(store.count(DEFAULT_COLLECTION).await?, 2);

    // Indexing again overwrites rather than duplicates
    indexer.index_corpus(&source).await?;
    assert_eq!(store.count(DEFAULT_COLLECTION).await?, 2);
    Ok(())
}

/// Test that a missing source directory yields an empty report
#[tokio::test]
async fn test_missing_source_directory() -> Result<()> {
    let temp_dir = tempdir()?;
    let store = Arc::new(SqliteStore::open_memory().await?);
    let indexer = Indexer::new(store, Arc::new(HashingProvider::new(32)), IndexerConfig::default()).await?;

    let report = indexer
        .index_corpus(&temp_dir.path().join("does-not-exist"))
        .await?;
    assert_eq!(report, Default::default());
    Ok(())
}

/// Test index, reopen, query across process-like boundaries
#[tokio::test]
async fn test_index_then_query_after_reopen() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = temp_dir.path().join("source");
    let db = temp_dir.path().join("db");
    write_corpus(&source)?;

    {
        let store = Arc::new(SqliteStore::open(&db).await?);
        let indexer = Indexer::new(
            store.clone(),
            Arc::new(HashingProvider::new(128)),
            IndexerConfig::default(),
        )
        .await?;
        indexer.index_corpus(&source).await?;
        store.close().await;
    }

    let store = Arc::new(SqliteStore::open(&db).await?);
    let retriever = Retriever::new(store, Arc::new(HashingProvider::new(128)), DEFAULT_COLLECTION);

    let result = retriever.query("beta decay electron", 5, true).await?;
    assert_eq!(result.len(), 2);
    assert_eq!(result.ids[0], "beta.md_chunk_0");
    assert!(result.distances[0] <= result.distances[1]);

    let metadata = &result.metadatas.as_ref().unwrap()[0];
    assert_eq!(metadata["filename"], "beta.md");
    assert_eq!(metadata["total_chunks"], 1);
    Ok(())
}

/// Test that reset empties the collection but keeps it queryable
#[tokio::test]
async fn test_reset_keeps_collection() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = temp_dir.path().join("source");
    write_corpus(&source)?;

    let store = Arc::new(SqliteStore::open_memory().await?);
    let embedder = Arc::new(HashingProvider::new(64));
    let indexer = Indexer::new(store.clone(), embedder.clone(), IndexerConfig::default()).await?;
    indexer.index_corpus(&source).await?;

    indexer.reset_index().await?;
    assert_eq!(indexer.stats().await?.document_count, 0);

    let collection = store.get_collection(DEFAULT_COLLECTION).await?.unwrap();
    assert_eq!(collection.metadata["description"], "PDF document embeddings");

    let retriever = Retriever::new(store.clone(), embedder, DEFAULT_COLLECTION);
    assert!(retriever.query("alpha", 3, true).await?.is_empty());

    store.delete_collection(DEFAULT_COLLECTION).await?;
    assert!(matches!(
        retriever.query("alpha", 3, true).await,
        Err(QueryError::NotReady { .. })
    ));
    Ok(())
}

/// Test custom collection names and extension filters
#[tokio::test]
async fn test_custom_collection_and_extensions() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = temp_dir.path().join("source");
    write_corpus(&source)?;

    let store = Arc::new(SqliteStore::open_memory().await?);
    let config = IndexerConfig::default()
        .with_collection_name("physics")
        .with_extensions(["md"]);
    let indexer = Indexer::new(store.clone(), Arc::new(HashingProvider::new(32)), config).await?;

    let report = indexer.index_corpus(&source).await?;
    assert_eq!((report.processed, report.failed), (1, 0));
    assert_eq!(store.count("physics").await?, 1);
    assert!(store.get_collection(DEFAULT_COLLECTION).await?.is_none());
    Ok(())
}
