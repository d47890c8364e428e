//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for turning query text into a dense
//! vector and provides two implementations: a local fastembed model and an
//! OpenAI-compatible HTTP embeddings endpoint.
//!
//! Whatever provider is used must produce vectors of the same dimensionality
//! the vector index was built with.

pub mod fastembed;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EmbeddingVector;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// The remote endpoint could not be reached
    #[error("Embedding endpoint unavailable: {0}")]
    Unavailable(String),

    /// The remote endpoint did not answer in time
    #[error("Embedding request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// The model could not be loaded or is misconfigured
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementations are expensive to construct and are meant to be created
/// once per process and shared behind an `Arc`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError::InvalidInput` for blank text, or another
    /// variant if generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<EmbeddingVector>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<EmbeddingVector>>;

    /// Dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Model name/identifier for this provider.
    fn model_name(&self) -> &str;
}

/// Collapse runs of whitespace and trim the ends.
///
/// Casing is preserved since the supported models are case-sensitive.
///
/// ```
/// use paper_vss::embedding::normalize_text;
///
/// assert_eq!(normalize_text("  Graph   neural\nnetworks "), "Graph neural networks");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check that a freshly produced vector has the expected length.
pub(crate) fn ensure_dimension(vector: &EmbeddingVector, expected: usize) -> EmbeddingResult<()> {
    if vector.dimension() != expected {
        return Err(EmbeddingError::Other(format!(
            "model produced {} dimensions, expected {}",
            vector.dimension(),
            expected
        )));
    }
    Ok(())
}
