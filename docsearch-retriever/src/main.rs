use clap::Parser;
use docsearch_context::text::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use docsearch_embed::{DEFAULT_MODEL, EmbedConfig, create_provider};
use docsearch_retriever::indexing::{DEFAULT_COLLECTION, Indexer, IndexerConfig};
use docsearch_retriever::storage::sqlite_store::SqliteStore;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Embed a folder of PDF and text documents into a searchable vector index.
#[derive(Parser, Debug)]
#[command(name = "docsearch-index", author, version, about, long_about = None)]
struct Args {
    /// Source directory containing the documents
    #[arg(short, long, default_value = "source")]
    source: PathBuf,

    /// Directory holding the index database
    #[arg(short, long, default_value = "./chroma_db")]
    db_path: PathBuf,

    /// Delete all indexed chunks before processing
    #[arg(short, long)]
    reset: bool,

    /// Collection to write into
    #[arg(short, long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Embedding model (`hashing` for the offline provider)
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let chunking = ChunkingConfig::new(args.chunk_size, args.chunk_overlap);
    chunking.validate()?;

    println!("Opening index at {}...", args.db_path.display());
    let store = Arc::new(SqliteStore::open(&args.db_path).await?);

    println!("Loading embedding model {}...", args.model);
    let embedder = create_provider(EmbedConfig::new(&args.model)).await?;

    let config = IndexerConfig::default()
        .with_collection_name(&args.collection)
        .with_chunking(chunking);
    let indexer = Indexer::new(store.clone(), embedder, config).await?;

    if args.reset {
        println!("Resetting collection '{}'...", args.collection);
        indexer.reset_index().await?;
    }

    let report = indexer.index_corpus(&args.source).await?;
    let stats = indexer.stats().await?;

    println!();
    println!("Processing complete!");
    println!("Successfully processed: {} documents", report.processed);
    println!("Failed: {} documents", report.failed);
    if report.skipped > 0 {
        println!("Skipped (no text): {} documents", report.skipped);
    }
    println!("Chunks written this run: {}", report.chunks_written);
    println!(
        "Total chunks in '{}': {}",
        stats.collection_name, stats.document_count
    );

    store.close().await;
    Ok(())
}
