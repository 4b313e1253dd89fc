//! axum routes over a shared [`SearchService`].

use crate::error::ServiceError;
use crate::service::{
    CollectionsPayload, HealthPayload, QueryRequest, SearchService, StatsPayload,
};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use docsearch_retriever::QueryResult;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

type AppState = Arc<SearchService>;

pub fn app_router(service: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/query", post(query))
        .route("/collections", get(collections))
        .with_state(service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "docsearch document search API",
        "status": "running",
    }))
}

async fn health(State(service): State<AppState>) -> Json<HealthPayload> {
    Json(service.health().await)
}

async fn stats(State(service): State<AppState>) -> Result<Json<StatsPayload>, ServiceError> {
    Ok(Json(service.stats().await?))
}

async fn query(
    State(service): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ServiceError> {
    tracing::debug!(
        "Query {:?} (n_results = {})",
        request.query,
        request.n_results
    );
    Ok(Json(service.query(request).await?))
}

async fn collections(
    State(service): State<AppState>,
) -> Result<Json<CollectionsPayload>, ServiceError> {
    Ok(Json(service.list_collections().await?))
}
