//! OpenAI-compatible embedding provider implementation.
//!
//! Talks to any HTTP endpoint that speaks the OpenAI embeddings protocol
//! (`POST {"model", "input": [...]}` answered with `{"data": [{"embedding"}]}`),
//! which covers OpenAI itself as well as self-hosted inference servers.

use super::{ensure_dimension, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::models::EmbeddingVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default endpoint for the hosted OpenAI API.
pub const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// OpenAI-compatible embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    embedding_dimension: usize,
    timeout: Duration,
}

impl OpenAIEmbedding {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `api_url` - Full URL of the embeddings endpoint
    /// * `api_key` - Bearer token, if the endpoint requires one
    /// * `model` - Model name sent with every request
    /// * `dimension` - Dimension the model produces; responses are checked against it
    /// * `timeout` - Per-request deadline
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> EmbeddingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            model: model.into(),
            embedding_dimension: dimension,
            timeout,
        })
    }

    async fn request(&self, texts: &[&str]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(url = %self.api_url, count = texts.len(), "requesting embeddings");
        let response = request.send().await.map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError(format!("HTTP {}: {}", status, detail)));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        collect_embeddings(parsed, texts.len(), self.embedding_dimension)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout(self.timeout.as_millis() as u64)
        } else if err.is_decode() {
            EmbeddingError::ApiError(format!("Malformed embeddings response: {}", err))
        } else if err.is_connect() || err.is_request() {
            EmbeddingError::Unavailable(err.to_string())
        } else {
            EmbeddingError::ApiError(err.to_string())
        }
    }
}

/// Order response data by its `index` field and validate count and dimension.
fn collect_embeddings(
    response: EmbeddingsResponse,
    expected_count: usize,
    dimension: usize,
) -> EmbeddingResult<Vec<EmbeddingVector>> {
    let mut data = response.data;
    if data.len() != expected_count {
        return Err(EmbeddingError::ApiError(format!(
            "expected {} embeddings, endpoint returned {}",
            expected_count,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

    let vectors: Vec<EmbeddingVector> = data
        .into_iter()
        .map(|d| EmbeddingVector::new(d.embedding))
        .collect();
    for vector in &vectors {
        ensure_dimension(vector, dimension)?;
    }
    Ok(vectors)
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<EmbeddingVector> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn parse(body: Value) -> EmbeddingsResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_collect_orders_by_index() {
        let response = parse(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        }));
        let vectors = collect_embeddings(response, 2, 2).unwrap();
        assert_eq!(vectors[0].as_slice(), &[1.0, 0.0]);
        assert_eq!(vectors[1].as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn test_collect_rejects_wrong_dimension() {
        let response = parse(json!({"data": [{"embedding": [1.0, 0.0, 0.0]}]}));
        assert!(collect_embeddings(response, 1, 2).is_err());
    }

    #[test]
    fn test_collect_rejects_wrong_count() {
        let response = parse(json!({"data": []}));
        assert!(matches!(
            collect_embeddings(response, 1, 2),
            Err(EmbeddingError::ApiError(_))
        ));
    }

    async fn spawn_endpoint() -> String {
        async fn handler(Json(body): Json<Value>) -> Json<Value> {
            let inputs = body["input"].as_array().cloned().unwrap_or_default();
            let data: Vec<Value> = inputs
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let len = text.as_str().unwrap_or_default().len() as f32;
                    json!({"index": i, "embedding": [len, 1.0, 0.0]})
                })
                .collect();
            Json(json!({"data": data}))
        }

        let app = Router::new().route("/v1/embeddings", post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/embeddings", addr)
    }

    #[tokio::test]
    async fn test_embed_against_local_endpoint() {
        let url = spawn_endpoint().await;
        let provider =
            OpenAIEmbedding::new(url, None, "test-model", 3, Duration::from_secs(5)).unwrap();

        let vector = provider.embed("abcd").await.unwrap();
        assert_eq!(vector.as_slice(), &[4.0, 1.0, 0.0]);

        let again = provider.embed("abcd").await.unwrap();
        assert_eq!(vector, again);

        let batch = provider.embed_batch(&["a", "abc"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].as_slice()[0], 3.0);
    }

    #[tokio::test]
    async fn test_embed_rejects_blank_text() {
        let provider = OpenAIEmbedding::new(
            "http://127.0.0.1:9/v1/embeddings",
            None,
            "test-model",
            3,
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(matches!(
            provider.embed("  ").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let provider = OpenAIEmbedding::new(
            "http://127.0.0.1:9/v1/embeddings",
            None,
            "test-model",
            3,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_) | EmbeddingError::Timeout(_)));
    }
}
