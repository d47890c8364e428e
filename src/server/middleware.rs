//! Request middleware.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ServerError;

/// Fail a request that runs past the configured deadline.
///
/// The response uses the regular JSON error body with code `TIMEOUT`.
pub async fn request_deadline(
    State(deadline): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ServerError::Timeout(deadline).into_response(),
    }
}
