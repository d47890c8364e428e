//! HTTP route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{ServerError, ServerResult};
use super::AppState;
use crate::service::Mode;
use crate::view::ModeView;

/// Body of every mode endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Free text: a passage, a topic description or a question
    pub query: String,
}

/// Response of a mode endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModeResponse {
    #[serde(flatten)]
    pub view: ModeView,

    pub count: usize,

    /// Set when nothing matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<ModeView> for ModeResponse {
    fn from(view: ModeView) -> Self {
        let count = view.len();
        Self {
            message: (count == 0).then_some("no results"),
            view,
            count,
        }
    }
}

/// Service name and endpoints.
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "Paper VSS",
        "version": crate::VERSION,
        "api_version": "v1",
        "endpoints": [
            "/api/v1/recommend",
            "/api/v1/topic",
            "/api/v1/answer",
            "/api/v1/modes",
            "/health"
        ]
    }))
}

/// Liveness and model state.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let (embedder_loaded, extractor_loaded) = state.service.models_loaded();
    Json(json!({
        "status": "healthy",
        "service": "paper-vss",
        "version": crate::VERSION,
        "backend": state.service.backend_name(),
        "models": {
            "embedding": embedder_loaded,
            "answer": extractor_loaded,
        },
        "uptime_seconds": state.started.elapsed().as_secs(),
    }))
}

/// The interaction modes and their endpoints.
pub async fn list_modes() -> Json<Value> {
    let modes: Vec<Value> = Mode::ALL
        .iter()
        .map(|mode| {
            json!({
                "mode": mode,
                "title": mode.title(),
                "description": mode.description(),
                "result_count": mode.result_count(),
                "endpoint": format!("/api/v1/{}", mode.slug()),
            })
        })
        .collect();
    Json(json!({ "modes": modes }))
}

async fn run_mode(
    state: AppState,
    mode: Mode,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    match state.service.run(mode, &request.query).await? {
        Some(view) => Ok(Json(ModeResponse::from(view)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Paper Recommendation: the five most similar papers.
pub async fn recommend(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> ServerResult<Response> {
    run_mode(state, Mode::Recommendation, body).await
}

/// Topic Identification: categories of the closest paper.
pub async fn identify_topic(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> ServerResult<Response> {
    run_mode(state, Mode::Topic, body).await
}

/// Question & Answering: an answer from the closest paper's abstract.
pub async fn answer_question(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> ServerResult<Response> {
    run_mode(state, Mode::Answer, body).await
}

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

#[cfg(test)]
mod tests {
    use super::super::{build_router, AppState};
    use crate::config::ServerSettings;
    use crate::models::{EmbeddingVector, SearchResult};
    use crate::query::SearchRequest;
    use crate::search::memory::InMemoryIndex;
    use crate::search::{BackendResult, SearchBackend, SearchError};
    use crate::service::testing::{service, service_with, MOCK_DIMENSION};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct DownBackend;

    #[async_trait]
    impl SearchBackend for DownBackend {
        async fn search(
            &self,
            _request: &SearchRequest,
            _vector: &EmbeddingVector,
        ) -> BackendResult<Vec<SearchResult>> {
            Err(SearchError::BackendUnavailable("connection refused".to_string()))
        }

        fn dimension(&self) -> usize {
            MOCK_DIMENSION
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn app_with(service: crate::service::PaperService) -> Router {
        build_router(AppState::new(Arc::new(service)), &ServerSettings::default())
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app_with(service())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "in-memory");
    }

    #[tokio::test]
    async fn test_modes_listing() {
        let response = app_with(service())
            .oneshot(Request::get("/api/v1/modes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        let modes = body["modes"].as_array().unwrap();
        assert_eq!(modes.len(), 3);
        assert_eq!(modes[0]["title"], "Paper Recommendation");
        assert_eq!(modes[0]["result_count"], 5);
    }

    #[tokio::test]
    async fn test_recommend_endpoint() {
        let response = app_with(service())
            .oneshot(post("/api/v1/recommend", r#"{"query": "graph neural networks"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["mode"], "recommendation");
        let results = body["results"].as_array().unwrap();
        assert!(!results.is_empty() && results.len() <= 5);
        assert!(results.iter().any(|r| r["title"] == "Graph Attention Networks"));
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_topic_endpoint() {
        let response = app_with(service())
            .oneshot(post("/api/v1/topic", r#"{"query": "deep residual networks for images"}"#))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert!(body["results"][0]["categories"].is_array());
    }

    #[tokio::test]
    async fn test_answer_endpoint() {
        let response = app_with(service())
            .oneshot(post("/api/v1/answer", r#"{"query": "What is the Transformer based on?"}"#))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["mode"], "answer");
        let card = &body["results"][0];
        let answer = card["answer"].as_str().unwrap();
        assert!(card["abstract"].as_str().unwrap().contains(answer));
    }

    #[tokio::test]
    async fn test_blank_query_is_no_content() {
        let response = app_with(service())
            .oneshot(post("/api/v1/answer", r#"{"query": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_empty_index_reports_no_results() {
        let app = app_with(service_with(Arc::new(InMemoryIndex::new(MOCK_DIMENSION))));
        let response = app
            .oneshot(post("/api/v1/recommend", r#"{"query": "anything"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 0);
        assert_eq!(body["message"], "no results");
    }

    #[tokio::test]
    async fn test_backend_down_is_retryable_503() {
        let app = app_with(service_with(Arc::new(DownBackend)));
        let response = app
            .oneshot(post("/api/v1/topic", r#"{"query": "graphs"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "BACKEND_UNAVAILABLE");
        assert_eq!(body["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = app_with(service())
            .oneshot(post("/api/v1/recommend", r#"{"text": 1}"#))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = app_with(service())
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
