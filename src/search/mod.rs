//! Search backends.
//!
//! A [`SearchBackend`] executes a [`SearchRequest`] against a vector index and
//! returns the hits, best match first. Two backends are provided: a RediSearch
//! client for production and an exact in-memory index.

pub mod memory;
pub mod redisearch;

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EmbeddingVector, SearchResult};
use crate::query::{SearchRequest, SortDirection};

/// Errors that can occur while talking to a search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The backend could not be reached or the connection dropped
    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend did not answer before the deadline
    #[error("Search backend timed out after {0:?}")]
    Timeout(Duration),

    /// The query vector does not have the index's dimensionality
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The backend rejected the request or returned an unreadable reply
    #[error("Query failed: {0}")]
    QueryError(String),
}

impl SearchError {
    /// Whether repeating the same interaction later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SearchError::BackendUnavailable(_) | SearchError::Timeout(_))
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, SearchError>;

/// Trait for vector search backends.
///
/// Implementations are long-lived and shared between interactions; `search`
/// must not mutate any backend state.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Execute a k-NN search.
    ///
    /// # Returns
    /// At most `request.k` results, ordered best match first. An empty index
    /// yields an empty vector.
    ///
    /// # Errors
    /// `DimensionMismatch` is returned before any I/O if `vector` does not
    /// have [`dimension`](Self::dimension) components.
    async fn search(
        &self,
        request: &SearchRequest,
        vector: &EmbeddingVector,
    ) -> BackendResult<Vec<SearchResult>>;

    /// Vector dimensionality the index was created with.
    fn dimension(&self) -> usize;

    /// Human-readable backend name for logging.
    fn name(&self) -> &str;
}

/// Fail fast when a vector's length disagrees with the index.
pub fn check_dimension(expected: usize, vector: &EmbeddingVector) -> BackendResult<()> {
    if vector.dimension() != expected {
        return Err(SearchError::DimensionMismatch {
            expected,
            actual: vector.dimension(),
        });
    }
    Ok(())
}

/// Order two hits: by score in `direction`, then by document id.
pub fn compare_results(a: &SearchResult, b: &SearchResult, direction: SortDirection) -> Ordering {
    let by_score = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
    let by_score = match direction {
        SortDirection::Ascending => by_score,
        SortDirection::Descending => by_score.reverse(),
    };
    by_score.then_with(|| a.paper.id.cmp(&b.paper.id))
}

/// Put hits into their final order and cut them to the page size.
///
/// Equal scores fall back to document id so the order never depends on what
/// the backend happened to emit first. The page offset is assumed to have been
/// applied by whoever produced `results`.
pub fn rank_results(mut results: Vec<SearchResult>, request: &SearchRequest) -> Vec<SearchResult> {
    results.sort_by(|a, b| compare_results(a, b, request.sort));
    results.truncate(request.paging.limit.min(request.k));
    results
}
