//! Errors surfaced at the HTTP boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use docsearch_embed::EmbedError;
use docsearch_retriever::StoreError;
use serde_json::json;

/// Request-time failures, each mapped to one status code.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service has not finished initializing
    #[error("{0}")]
    NotReady(String),

    /// The collection does not exist (yet)
    #[error("{0}")]
    CollectionNotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", status, self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Failures while bringing the service up. These are fatal for the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open vector store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to load embedding model: {0}")]
    Embedding(#[from] EmbedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::NotReady("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::CollectionNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = ServiceError::CollectionNotFound("missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
