//! Paper VSS - semantic search over a vector index of paper abstracts.
//!
//! This library embeds free text, runs a k-nearest-neighbor query against a
//! RediSearch index of paper abstract embeddings and turns the hits into one
//! of three views: paper recommendations, the topic (categories) of the
//! closest paper, or an answer extracted from the closest abstract.
//!
//! # Architecture
//!
//! - **models**: Core data structures (Paper, SearchResult, AnswerSpan, ...)
//! - **embedding**: Text embedding providers (fastembed, OpenAI-compatible HTTP)
//! - **query**: k-NN request construction
//! - **search**: Search backends (RediSearch, in-memory)
//! - **qa**: Extractive question answering (ONNX Runtime)
//! - **service**: Orchestration of the three interaction modes
//! - **view**: Typed view-models rendered by the front-ends
//! - **server**: HTTP API
//! - **config**: Layered configuration
//!
//! # Workflow
//!
//! 1. Normalize and embed the query text
//! 2. Build (once per mode) a KNN request: `*=>[KNN k @vector $vec_param AS vector_score]`
//! 3. Send it with the raw vector bytes to the index, sorted by ascending distance
//! 4. In question-answering mode, extract an answer span from the returned abstract
//! 5. Return typed cards
//!
//! # Example
//!
//! ```no_run
//! use paper_vss::{config::AppConfig, service::{Mode, PaperService}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     let service = PaperService::from_config(&config).await?;
//!     service.verify().await?;
//!
//!     if let Some(view) = service.run(Mode::Recommendation, "graph neural networks").await? {
//!         println!("{}", serde_json::to_string_pretty(&view)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embedding;
pub mod models;
pub mod qa;
pub mod query;
pub mod search;
pub mod server;
pub mod service;
pub mod view;

// Re-export commonly used types at the crate root
pub use embedding::EmbeddingProvider;
pub use models::{AnswerSpan, EmbeddingVector, Paper, RelevanceLevel, SearchResult};
pub use qa::AnswerExtractor;
pub use query::{build_query, QueryBuilder, SearchRequest};
pub use search::SearchBackend;
pub use service::{Mode, PaperService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the search index
pub const DEFAULT_INDEX_NAME: &str = "index";

/// Dimension of the default embedding model
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
