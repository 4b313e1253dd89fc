//! The search service behind the HTTP routes.
//!
//! A [`SearchService`] owns the store handle, the retriever and the readiness
//! state. It is created once at startup, shared through `Arc`, and brought up
//! with [`SearchService::init`] before the listener starts accepting requests.

use crate::ServerConfig;
use crate::error::{ServiceError, StartupError};
use docsearch_embed::{EmbedConfig, EmbeddingProvider, create_provider};
use docsearch_retriever::retrieval::{DEFAULT_N_RESULTS, QueryError, QueryResult, Retriever};
use docsearch_retriever::storage::{Metadata, VectorStore};
use docsearch_retriever::SqliteStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

/// Readiness of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    /// The store is reachable but the collection does not exist yet
    Degraded,
}

impl ServiceState {
    fn is_initialized(self) -> bool {
        matches!(self, ServiceState::Ready | ServiceState::Degraded)
    }
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

fn default_n_results() -> usize {
    DEFAULT_N_RESULTS
}

fn default_include_metadata() -> bool {
    true
}

/// Answer of `GET /stats`, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsPayload {
    Ready {
        collection_name: String,
        document_count: usize,
        db_path: String,
    },
    NoCollection {
        message: String,
    },
    Error {
        message: String,
    },
    /// Only reported through `/health`; `/stats` answers 503 instead
    NotInitialized,
}

/// The `service` part of a health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    #[serde(flatten)]
    pub stats: StatsPayload,
    pub state: ServiceState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthPayload {
    pub health: &'static str,
    pub service: ServiceHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionsPayload {
    pub collections: Vec<CollectionInfo>,
}

struct Backend {
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    /// Kept to release the pool on shutdown
    sqlite: Option<SqliteStore>,
}

pub struct SearchService {
    config: ServerConfig,
    state: RwLock<ServiceState>,
    backend: OnceCell<Backend>,
}

impl SearchService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ServiceState::Uninitialized),
            backend: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the on-disk store, load the configured model and determine readiness.
    pub async fn init(&self) -> Result<ServiceState, StartupError> {
        if self.backend.initialized() {
            return Ok(self.state().await);
        }

        info!("Opening index at {}", self.config.db_path.display());
        let sqlite = SqliteStore::open(&self.config.db_path).await?;

        info!("Loading embedding model {}", self.config.model);
        let embedder = match create_provider(EmbedConfig::new(&self.config.model)).await {
            Ok(embedder) => embedder,
            Err(e) => {
                sqlite.close().await;
                return Err(e.into());
            }
        };

        self.install(Arc::new(sqlite.clone()), embedder, Some(sqlite))
            .await
    }

    /// Initialize against an already opened store and provider.
    pub async fn init_with(
        &self,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<ServiceState, StartupError> {
        self.install(store, embedder, None).await
    }

    async fn install(
        &self,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        sqlite: Option<SqliteStore>,
    ) -> Result<ServiceState, StartupError> {
        if self.backend.initialized() {
            return Ok(self.state().await);
        }
        *self.state.write().await = ServiceState::Initializing;

        let retriever = Retriever::new(store.clone(), embedder, &self.config.collection);
        let state = match retriever.is_ready().await {
            Ok(true) => ServiceState::Ready,
            Ok(false) => {
                warn!(
                    "Collection '{}' not found. Run the indexer first.",
                    self.config.collection
                );
                ServiceState::Degraded
            }
            Err(e) => {
                *self.state.write().await = ServiceState::Uninitialized;
                return Err(e.into());
            }
        };

        let backend = Backend {
            store,
            retriever,
            sqlite,
        };
        if self.backend.set(backend).is_err() {
            // Another init won the race
            return Ok(self.state().await);
        }

        *self.state.write().await = state;
        info!("Search service initialized: {:?}", state);
        Ok(state)
    }

    /// Release the store. The service keeps its last state.
    pub async fn shutdown(&self) {
        if let Some(sqlite) = self.backend.get().and_then(|b| b.sqlite.as_ref()) {
            sqlite.close().await;
        }
        info!("Search service shut down");
    }

    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    /// Current state, re-checking the collection when reloading is enabled.
    async fn current_state(&self) -> ServiceState {
        let state = self.state().await;
        if !self.config.reload || !state.is_initialized() {
            return state;
        }
        let Some(backend) = self.backend.get() else {
            return state;
        };

        let refreshed = match backend.retriever.is_ready().await {
            Ok(true) => ServiceState::Ready,
            Ok(false) => ServiceState::Degraded,
            Err(e) => {
                warn!("Failed to check collection '{}': {}", self.config.collection, e);
                return state;
            }
        };
        if refreshed != state {
            info!("Service state changed: {:?} -> {:?}", state, refreshed);
            *self.state.write().await = refreshed;
        }
        refreshed
    }

    fn missing_collection_message(&self) -> String {
        format!(
            "Collection '{}' not found. Run the indexer first.",
            self.config.collection
        )
    }

    /// Backend of an initialized service, or 503.
    async fn ready_backend(&self) -> Result<(&Backend, ServiceState), ServiceError> {
        let state = self.current_state().await;
        match self.backend.get() {
            Some(backend) if state.is_initialized() => Ok((backend, state)),
            _ => Err(ServiceError::NotReady("Service not initialized".to_string())),
        }
    }

    pub async fn health(&self) -> HealthPayload {
        let stats = match self.stats().await {
            Ok(stats) => stats,
            Err(_) => StatsPayload::NotInitialized,
        };
        let state = match stats {
            // A failing store is reported as degraded
            StatsPayload::Error { .. } => ServiceState::Degraded,
            _ => self.state().await,
        };

        HealthPayload {
            health: "ok",
            service: ServiceHealth { stats, state },
        }
    }

    pub async fn stats(&self) -> Result<StatsPayload, ServiceError> {
        let (backend, state) = self.ready_backend().await?;
        if state == ServiceState::Degraded {
            return Ok(StatsPayload::NoCollection {
                message: self.missing_collection_message(),
            });
        }

        Ok(match backend.retriever.count().await {
            Ok(document_count) => StatsPayload::Ready {
                collection_name: self.config.collection.clone(),
                document_count,
                db_path: self.config.db_path.display().to_string(),
            },
            Err(QueryError::NotReady { .. }) => StatsPayload::NoCollection {
                message: self.missing_collection_message(),
            },
            Err(e) => StatsPayload::Error {
                message: e.to_string(),
            },
        })
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResult, ServiceError> {
        let (backend, state) = self.ready_backend().await?;
        if state == ServiceState::Degraded {
            return Err(ServiceError::CollectionNotFound(
                self.missing_collection_message(),
            ));
        }

        backend
            .retriever
            .query(&request.query, request.n_results, request.include_metadata)
            .await
            .map_err(|e| match e {
                QueryError::NotReady { .. } => {
                    ServiceError::CollectionNotFound(self.missing_collection_message())
                }
                other => ServiceError::Internal(format!("Query failed: {other}")),
            })
    }

    pub async fn list_collections(&self) -> Result<CollectionsPayload, ServiceError> {
        let (backend, _) = self.ready_backend().await?;
        let collections = backend
            .store
            .list_collections()
            .await
            .map_err(|e| ServiceError::Internal(format!("Failed to list collections: {e}")))?;

        Ok(CollectionsPayload {
            collections: collections
                .into_iter()
                .map(|c| CollectionInfo {
                    name: c.name,
                    metadata: c.metadata,
                })
                .collect(),
        })
    }
}
