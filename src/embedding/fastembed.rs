//! FastEmbed embedding provider implementation.
//!
//! Runs a sentence-embedding model locally through the fastembed library.
//! Model weights are fetched into the cache directory on first construction.

use super::{ensure_dimension, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::models::EmbeddingVector;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Default model: a 768-dimension mpnet sentence encoder.
pub const DEFAULT_FASTEMBED_MODEL: &str = "paraphrase-multilingual-mpnet-base-v2";

/// Supported model names, their fastembed variants and output dimensions.
const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("nomic-embed-text-v1", 768),
    ("nomic-embed-text-v1.5", 768),
    ("paraphrase-multilingual-minilm-l12-v2", 384),
    ("paraphrase-multilingual-mpnet-base-v2", 768),
];

/// Resolve a configured model name to a fastembed model and its dimension.
///
/// Matching is case-insensitive and ignores an optional organisation prefix
/// such as `sentence-transformers/`.
pub fn resolve_model(name: &str) -> EmbeddingResult<(EmbeddingModel, usize)> {
    let key = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .trim()
        .to_ascii_lowercase();
    let model = match key.as_str() {
        "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "nomic-embed-text-v1" => EmbeddingModel::NomicEmbedTextV1,
        "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
        "paraphrase-multilingual-minilm-l12-v2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        "paraphrase-multilingual-mpnet-base-v2" => EmbeddingModel::ParaphraseMLMpnetBaseV2,
        _ => {
            let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|(n, _)| *n).collect();
            return Err(EmbeddingError::ModelUnavailable(format!(
                "unsupported fastembed model '{}'; expected one of: {}",
                name,
                known.join(", ")
            )));
        }
    };
    let dimension = SUPPORTED_MODELS
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, d)| *d)
        .unwrap_or(384);
    Ok((model, dimension))
}

/// FastEmbed embedding provider.
///
/// Holds the loaded model behind an `Arc<Mutex>` so clones share one
/// instance. Inference runs on the blocking thread pool.
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Load a FastEmbed model.
    ///
    /// # Arguments
    /// * `model_name` - One of the supported model names
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ModelUnavailable` if the name is unknown or the
    /// model cannot be initialized
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let (model_type, embedding_dimension) = resolve_model(model_name)?;

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ModelUnavailable(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        info!(model = model_name, dimension = embedding_dimension, "fastembed model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: model_name.to_string(),
            embedding_dimension,
        })
    }
}

impl FastEmbedProvider {
    async fn embed_blocking(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Other("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Other(format!("Embedding task failed: {}", e)))?
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<EmbeddingVector> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let embeddings = self.embed_blocking(vec![text.to_string()]).await?;

        let vector = embeddings
            .into_iter()
            .next()
            .map(EmbeddingVector::new)
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))?;
        ensure_dimension(&vector, self.embedding_dimension)?;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let embeddings = self.embed_blocking(text_strings).await?;

        let vectors: Vec<EmbeddingVector> = embeddings.into_iter().map(EmbeddingVector::new).collect();
        for vector in &vectors {
            ensure_dimension(vector, self.embedding_dimension)?;
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_names() {
        let (_, dim) = resolve_model("bge-base-en-v1.5").unwrap();
        assert_eq!(dim, 768);

        let (_, dim) = resolve_model("sentence-transformers/paraphrase-multilingual-mpnet-base-v2").unwrap();
        assert_eq!(dim, 768);

        let (_, dim) = resolve_model("All-MiniLM-L6-v2").unwrap();
        assert_eq!(dim, 384);
    }

    #[test]
    fn test_resolve_unknown_model() {
        match resolve_model("word2vec") {
            Err(EmbeddingError::ModelUnavailable(msg)) => {
                assert!(msg.contains("word2vec"));
                assert!(msg.contains(DEFAULT_FASTEMBED_MODEL));
            }
            other => panic!("Expected ModelUnavailable, got {:?}", other.map(|(_, d)| d)),
        }
    }

    #[test]
    fn test_default_model_is_supported() {
        assert!(resolve_model(DEFAULT_FASTEMBED_MODEL).is_ok());
    }

    fn create_test_provider() -> FastEmbedProvider {
        FastEmbedProvider::new("all-minilm-l6-v2", None)
            .expect("Failed to create FastEmbedProvider")
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_single_text() {
        let provider = create_test_provider();
        let embedding = provider
            .embed("This is a test sentence for embedding generation.")
            .await
            .unwrap();
        assert_eq!(embedding.dimension(), provider.dimension());
        assert!(embedding.as_slice().iter().all(|x| x.is_finite()));
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_consistency() {
        let provider = create_test_provider();
        let first = provider.embed("Consistency test text").await.unwrap();
        let second = provider.embed("Consistency test text").await.unwrap();
        assert_eq!(first, second, "Same text should produce identical embeddings");
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_empty_text() {
        let provider = create_test_provider();
        assert!(matches!(
            provider.embed("   \n\t  ").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_batch_matches_single() {
        let provider = create_test_provider();
        let single = provider.embed("Test text for consistency").await.unwrap();
        let batch = provider.embed_batch(&["Test text for consistency"]).await.unwrap();
        assert_eq!(single, batch[0]);
    }
}
