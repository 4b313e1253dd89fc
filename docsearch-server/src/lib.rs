//! # docsearch-server
//!
//! HTTP front end for a docsearch index. It answers semantic queries against the
//! collection written by `docsearch-index` and reports on the index's health.
//!
//! ## Endpoints
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | Liveness banner |
//! | `GET /health` | Always answers, with the service state |
//! | `GET /stats` | Collection name, chunk count and database path |
//! | `POST /query` | `{query, n_results?, include_metadata?}` nearest chunks |
//! | `GET /collections` | Every collection with its metadata |
//!
//! Failures answer with `{"detail": "..."}`: 503 before initialization, 404 when the
//! collection has not been created, 500 for store or embedding errors.
//!
//! ## Quick Start
//!
//! ```bash
//! docsearch-index --source ./papers
//! docsearch-server --port 8000
//! curl -X POST localhost:8000/query -H 'content-type: application/json' \
//!      -d '{"query": "beta decay", "n_results": 3}'
//! ```
//!
//! ## Use as a library
//!
//! ```no_run
//! use docsearch_server::{ServerConfig, run_server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig {
//!     port: 9000,
//!     ..ServerConfig::default()
//! };
//! run_server(config).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use docsearch_embed::DEFAULT_MODEL;
use docsearch_retriever::indexing::DEFAULT_COLLECTION;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub mod error;
pub mod routes;
pub mod service;

pub use error::{ServiceError, StartupError};
pub use routes::app_router;
pub use service::{QueryRequest, SearchService, ServiceState};

/// Settings for a server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory holding the index database
    pub db_path: PathBuf,
    /// Collection answering queries
    pub collection: String,
    pub host: String,
    pub port: u16,
    /// Re-check the collection on every request
    pub reload: bool,
    /// Embedding model; must match the one used for indexing
    pub model: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./chroma_db"),
            collection: DEFAULT_COLLECTION.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            reload: false,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Initialize the service and serve until SIGINT or SIGTERM.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let addr = config.socket_addr()?;
    let service = Arc::new(SearchService::new(config));

    let state = service.init().await?;
    info!("Service state: {:?}", state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("docsearch server listening on http://{}", addr);

    axum::serve(listener, app_router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
