use clap::Parser;
use docsearch_embed::DEFAULT_MODEL;
use docsearch_retriever::indexing::DEFAULT_COLLECTION;
use docsearch_server::{ServerConfig, run_server};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Serve semantic search over a docsearch index.
#[derive(Parser, Debug)]
#[command(name = "docsearch-server", author, version, about, long_about = None)]
struct Args {
    /// Directory holding the index database
    #[arg(short, long, default_value = "./chroma_db")]
    db_path: PathBuf,

    /// Collection to query
    #[arg(short, long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Re-check the collection on every request (development)
    #[arg(long)]
    reload: bool,

    /// Embedding model; must match the one the index was built with
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            db_path: args.db_path,
            collection: args.collection,
            host: args.host,
            port: args.port,
            reload: args.reload,
            model: args.model,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run_server(args.into()).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
