//! Interaction orchestration.
//!
//! [`PaperService`] wires the embedding model, the search backend and the
//! answer extractor together and implements the three user-facing modes:
//!
//! 1. Normalize and embed the query text
//! 2. Run the prebuilt k-NN request for the mode against the index
//! 3. In question-answering mode, extract an answer from each hit's abstract
//! 4. Return typed cards for the front-end to render

pub mod lazy;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AppConfig, ConfigError, EmbeddingBackendKind};
use crate::embedding::fastembed::FastEmbedProvider;
use crate::embedding::openai::OpenAIEmbedding;
use crate::embedding::{normalize_text, EmbeddingError, EmbeddingProvider};
use crate::models::SearchResult;
use crate::qa::onnx::OnnxAnswerExtractor;
use crate::qa::{AnswerExtractor, QaError};
use crate::query::{QueryBuilder, QueryError, SearchRequest};
use crate::search::redisearch::RedisSearchClient;
use crate::search::{SearchBackend, SearchError};
use crate::view::{AnswerCard, ModeView, PaperCard, TopicCard};

pub use lazy::LazyModel;

/// Search strategy used by every mode.
pub const SEARCH_STRATEGY: &str = "KNN";

/// The three interaction modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Five most similar papers
    Recommendation,
    /// Categories of the closest paper
    Topic,
    /// Answer extracted from the closest paper
    Answer,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Recommendation, Mode::Topic, Mode::Answer];

    /// Title shown in the front-ends.
    pub fn title(&self) -> &'static str {
        match self {
            Mode::Recommendation => "Paper Recommendation",
            Mode::Topic => "Topic Identification",
            Mode::Answer => "Question & Answering",
        }
    }

    /// Number of nearest neighbors the mode retrieves.
    pub fn result_count(&self) -> usize {
        match self {
            Mode::Recommendation => 5,
            Mode::Topic | Mode::Answer => 1,
        }
    }

    /// URL path segment.
    pub fn slug(&self) -> &'static str {
        match self {
            Mode::Recommendation => "recommend",
            Mode::Topic => "topic",
            Mode::Answer => "answer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mode::Recommendation => "Find papers similar to a passage of text",
            Mode::Topic => "Show the categories of the paper closest to a text",
            Mode::Answer => "Answer a question from the most relevant abstract",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        match wanted.as_str() {
            "recommend" | "recommendation" | "paper recommendation" | "papers" => {
                Ok(Mode::Recommendation)
            }
            "topic" | "topics" | "topic identification" => Ok(Mode::Topic),
            "answer" | "qa" | "question" | "question & answering" => Ok(Mode::Answer),
            _ => Err(format!(
                "unknown mode '{}' (expected recommend, topic or answer)",
                s
            )),
        }
    }
}

/// Errors surfaced by an interaction.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Qa(#[from] QaError),

    /// A lazily loaded model failed to load
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// Whether the same interaction may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Search(e) => e.is_transient(),
            ServiceError::Embedding(EmbeddingError::Timeout(_)) => true,
            ServiceError::Embedding(EmbeddingError::Unavailable(_)) => true,
            ServiceError::Embedding(EmbeddingError::ModelUnavailable(_)) => true,
            ServiceError::Qa(QaError::ModelUnavailable(_)) => true,
            ServiceError::ModelUnavailable(_) => true,
            _ => false,
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Long-lived service shared by all interactions.
pub struct PaperService {
    embedder: LazyModel<dyn EmbeddingProvider>,
    backend: Arc<dyn SearchBackend>,
    extractor: LazyModel<dyn AnswerExtractor>,
    recommend_request: SearchRequest,
    topic_request: SearchRequest,
    answer_request: SearchRequest,
}

impl PaperService {
    /// Assemble a service and prebuild the request for each mode.
    ///
    /// # Errors
    /// `Query` if `builder` cannot produce a request for a mode
    pub fn new(
        embedder: LazyModel<dyn EmbeddingProvider>,
        backend: Arc<dyn SearchBackend>,
        extractor: LazyModel<dyn AnswerExtractor>,
        builder: &QueryBuilder,
    ) -> ServiceResult<Self> {
        Ok(Self {
            embedder,
            backend,
            extractor,
            recommend_request: builder.build(SEARCH_STRATEGY, Mode::Recommendation.result_count())?,
            topic_request: builder.build(SEARCH_STRATEGY, Mode::Topic.result_count())?,
            answer_request: builder.build(SEARCH_STRATEGY, Mode::Answer.result_count())?,
        })
    }

    /// Connect to the configured backend and set up lazy model loaders.
    ///
    /// Models are not loaded here; call [`verify`](Self::verify) to load the
    /// embedder eagerly.
    pub async fn from_config(config: &AppConfig) -> ServiceResult<Self> {
        config.validate()?;

        let backend = RedisSearchClient::connect(&config.redis).await?;
        let builder = QueryBuilder::new().with_vector_field(config.redis.vector_field.clone())?;

        Self::new(
            embedder_from_config(config),
            Arc::new(backend),
            extractor_from_config(config),
            &builder,
        )
    }

    /// The prebuilt request for `mode`.
    pub fn request(&self, mode: Mode) -> &SearchRequest {
        match mode {
            Mode::Recommendation => &self.recommend_request,
            Mode::Topic => &self.topic_request,
            Mode::Answer => &self.answer_request,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn models_loaded(&self) -> (bool, bool) {
        (self.embedder.is_loaded(), self.extractor.is_loaded())
    }

    /// Load the embedder and check it against the index dimension.
    ///
    /// # Errors
    /// * `ModelUnavailable` if the embedder cannot be loaded
    /// * `Search(DimensionMismatch)` if the model and index disagree
    pub async fn verify(&self) -> ServiceResult<()> {
        let embedder = self.embedder().await?;
        if embedder.dimension() != self.backend.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: self.backend.dimension(),
                actual: embedder.dimension(),
            }
            .into());
        }
        info!(
            model = embedder.model_name(),
            backend = self.backend.name(),
            dimension = embedder.dimension(),
            "embedding model matches index"
        );
        Ok(())
    }

    async fn embedder(&self) -> ServiceResult<Arc<dyn EmbeddingProvider>> {
        self.embedder.get().await.map_err(ServiceError::ModelUnavailable)
    }

    /// Embed `text` and retrieve the nearest papers for `mode`.
    async fn retrieve(&self, mode: Mode, text: &str) -> ServiceResult<Vec<SearchResult>> {
        let started = Instant::now();
        let normalized = normalize_text(text);

        let embedder = self.embedder().await?;
        let vector = embedder.embed(&normalized).await?;
        let embedded = started.elapsed();

        let request = self.request(mode);
        let results = self.backend.search(request, &vector).await?;

        debug!(
            mode = mode.slug(),
            k = request.k,
            hits = results.len(),
            embed_ms = embedded.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "retrieved papers"
        );
        Ok(results)
    }

    /// Five papers most similar to `text`.
    pub async fn recommend(&self, text: &str) -> ServiceResult<Vec<PaperCard>> {
        let results = self.retrieve(Mode::Recommendation, text).await?;
        Ok(results.into_iter().map(PaperCard::from).collect())
    }

    /// Categories of the paper closest to `text`.
    pub async fn identify_topic(&self, text: &str) -> ServiceResult<Vec<TopicCard>> {
        let results = self.retrieve(Mode::Topic, text).await?;
        Ok(results.into_iter().map(TopicCard::from).collect())
    }

    /// Answer `question` from the abstract of the closest paper.
    ///
    /// A hit with an empty abstract yields a card without an answer; the
    /// extraction model is only loaded when there is something to read.
    pub async fn answer_question(&self, question: &str) -> ServiceResult<Vec<AnswerCard>> {
        let results = self.retrieve(Mode::Answer, question).await?;

        let mut cards = Vec::with_capacity(results.len());
        for result in results {
            if result.paper.abstract_text.trim().is_empty() {
                cards.push(AnswerCard::new(result, None));
                continue;
            }

            let extractor = self
                .extractor
                .get()
                .await
                .map_err(ServiceError::ModelUnavailable)?;
            let answer = match extractor
                .extract_answer(question, &result.paper.abstract_text)
                .await
            {
                Ok(span) => Some(span),
                Err(QaError::EmptyContext) => None,
                Err(e) => return Err(e.into()),
            };
            cards.push(AnswerCard::new(result, answer));
        }
        Ok(cards)
    }

    /// Run one interaction.
    ///
    /// # Returns
    /// `None` when `text` is blank: nothing is embedded or searched
    pub async fn run(&self, mode: Mode, text: &str) -> ServiceResult<Option<ModeView>> {
        if text.trim().is_empty() {
            debug!(mode = mode.slug(), "blank input ignored");
            return Ok(None);
        }

        let query = text.trim().to_string();
        let view = match mode {
            Mode::Recommendation => ModeView::Recommendation {
                papers: self.recommend(&query).await?,
                query,
            },
            Mode::Topic => ModeView::Topic {
                topics: self.identify_topic(&query).await?,
                query,
            },
            Mode::Answer => ModeView::Answer {
                answers: self.answer_question(&query).await?,
                query,
            },
        };

        info!(mode = mode.slug(), results = view.len(), "interaction complete");
        Ok(Some(view))
    }
}

impl fmt::Debug for PaperService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaperService")
            .field("embedder", &self.embedder)
            .field("backend", &self.backend.name())
            .field("extractor", &self.extractor)
            .finish()
    }
}

/// Lazy embedder for the configured provider.
pub fn embedder_from_config(config: &AppConfig) -> LazyModel<dyn EmbeddingProvider> {
    let settings = config.embedding.clone();
    LazyModel::new(settings.model.clone(), move || {
        let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
            EmbeddingBackendKind::Fastembed => Arc::new(
                FastEmbedProvider::new(&settings.model, settings.cache_dir.clone())
                    .map_err(|e| e.to_string())?,
            ),
            EmbeddingBackendKind::OpenAi => Arc::new(
                OpenAIEmbedding::new(
                    settings.endpoint().to_string(),
                    settings.api_key.clone(),
                    settings.model.clone(),
                    settings.dimension,
                    Duration::from_millis(settings.timeout_ms),
                )
                .map_err(|e| e.to_string())?,
            ),
        };
        Ok(provider)
    })
}

/// Lazy answer extractor for the configured ONNX model.
pub fn extractor_from_config(config: &AppConfig) -> LazyModel<dyn AnswerExtractor> {
    let settings = config.qa.clone();
    LazyModel::new("answer-extractor", move || {
        let (Some(model_path), Some(tokenizer_path)) = (&settings.model_path, &settings.tokenizer_path)
        else {
            return Err("qa.model_path and qa.tokenizer_path must be configured".to_string());
        };
        let extractor = OnnxAnswerExtractor::load(
            model_path,
            tokenizer_path,
            settings.max_answer_len,
            settings.max_sequence_len,
            settings.doc_stride,
        )
        .map_err(|e| e.to_string())?;
        Ok(Arc::new(extractor) as Arc<dyn AnswerExtractor>)
    })
}
