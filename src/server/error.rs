use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::embedding::EmbeddingError;
use crate::qa::QaError;
use crate::search::SearchError;
use crate::service::ServiceError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,

    /// Whether sending the same request later may succeed
    pub retryable: bool,
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Service(e) => match e {
                ServiceError::Query(_) => StatusCode::BAD_REQUEST,
                ServiceError::Embedding(EmbeddingError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
                ServiceError::Qa(QaError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
                ServiceError::Embedding(EmbeddingError::ApiError(_)) => StatusCode::BAD_GATEWAY,
                ServiceError::Embedding(EmbeddingError::Unavailable(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ServiceError::Search(SearchError::QueryError(_)) => StatusCode::BAD_GATEWAY,
                ServiceError::Search(SearchError::DimensionMismatch { .. }) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::NotFound => "NOT_FOUND",
            ServerError::Timeout(_) => "TIMEOUT",
            ServerError::Service(e) => match e {
                ServiceError::Query(_) => "INVALID_ARGUMENT",
                ServiceError::Embedding(EmbeddingError::InvalidInput(_))
                | ServiceError::Qa(QaError::InvalidInput(_)) => "INVALID_INPUT",
                ServiceError::Embedding(EmbeddingError::Timeout(_)) => "TIMEOUT",
                ServiceError::Embedding(EmbeddingError::Unavailable(_)) => "EMBEDDING_UNAVAILABLE",
                ServiceError::Embedding(EmbeddingError::ModelUnavailable(_))
                | ServiceError::Qa(QaError::ModelUnavailable(_))
                | ServiceError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
                ServiceError::Embedding(_) => "EMBEDDING_ERROR",
                ServiceError::Search(SearchError::BackendUnavailable(_)) => "BACKEND_UNAVAILABLE",
                ServiceError::Search(SearchError::Timeout(_)) => "TIMEOUT",
                ServiceError::Search(SearchError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
                ServiceError::Search(SearchError::QueryError(_)) => "QUERY_ERROR",
                ServiceError::Qa(QaError::EmptyContext) => "EMPTY_CONTEXT",
                ServiceError::Qa(_) => "ANSWER_ERROR",
                ServiceError::Config(_) => "CONFIG_ERROR",
            },
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ServerError::Timeout(_) => true,
            ServerError::Service(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                retryable: self.retryable(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryError;

    fn status(err: ServiceError) -> (StatusCode, bool) {
        let err = ServerError::from(err);
        (err.status_code(), err.retryable())
    }

    #[test]
    fn test_transient_failures_are_503_and_retryable() {
        assert_eq!(
            status(SearchError::BackendUnavailable("refused".into()).into()),
            (StatusCode::SERVICE_UNAVAILABLE, true)
        );
        assert_eq!(
            status(SearchError::Timeout(Duration::from_secs(10)).into()),
            (StatusCode::SERVICE_UNAVAILABLE, true)
        );
        assert_eq!(
            status(ServiceError::ModelUnavailable("no weights".into())),
            (StatusCode::SERVICE_UNAVAILABLE, true)
        );
    }

    #[test]
    fn test_unreachable_embedding_endpoint_is_retryable() {
        let err = ServerError::from(ServiceError::from(EmbeddingError::Unavailable(
            "connection refused".into(),
        )));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "EMBEDDING_UNAVAILABLE");
        assert!(err.retryable());
    }

    #[test]
    fn test_request_timeout_body() {
        let err = ServerError::Timeout(Duration::from_secs(30));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error_code(), "TIMEOUT");
        assert!(err.retryable());
    }

    #[test]
    fn test_permanent_failures() {
        assert_eq!(
            status(SearchError::DimensionMismatch { expected: 768, actual: 384 }.into()),
            (StatusCode::INTERNAL_SERVER_ERROR, false)
        );
        assert_eq!(
            status(SearchError::QueryError("Syntax error".into()).into()),
            (StatusCode::BAD_GATEWAY, false)
        );
        assert_eq!(
            status(QueryError::InvalidArgument("k".into()).into()),
            (StatusCode::BAD_REQUEST, false)
        );
    }

    #[test]
    fn test_error_codes() {
        let err = ServerError::from(ServiceError::from(SearchError::BackendUnavailable(
            "down".into(),
        )));
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
        assert_eq!(ServerError::NotFound.error_code(), "NOT_FOUND");
    }
}
