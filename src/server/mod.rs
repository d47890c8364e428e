//! HTTP front-end.
//!
//! Exposes the three interaction modes as JSON endpoints:
//!
//! - `POST /api/v1/recommend` - Paper Recommendation
//! - `POST /api/v1/topic` - Topic Identification
//! - `POST /api/v1/answer` - Question & Answering
//!
//! plus `GET /`, `GET /health` and `GET /api/v1/modes`. Every mode endpoint
//! takes `{"query": "..."}`; a blank query is answered with `204 No Content`.

pub mod error;
pub mod middleware;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, ServerSettings};
use crate::service::PaperService;

pub use error::{ServerError, ServerResult};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaperService>,
    pub started: Instant,
}

impl AppState {
    pub fn new(service: Arc<PaperService>) -> Self {
        Self {
            service,
            started: Instant::now(),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, settings: &ServerSettings) -> Router {
    let cors = if settings.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(routes::api_info))
        .route("/health", get(routes::health_check))
        .route("/api/v1/modes", get(routes::list_modes))
        .route("/api/v1/recommend", post(routes::recommend))
        .route("/api/v1/topic", post(routes::identify_topic))
        .route("/api/v1/answer", post(routes::answer_question))
        .fallback(routes::not_found)
        .layer(from_fn_with_state(settings.timeout(), middleware::request_deadline))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until SIGTERM or Ctrl+C.
///
/// # Initialization
///
/// 1. Sets up JSON logging at `server.log_level` (overridable with `RUST_LOG`)
/// 2. Connects to the search backend
/// 3. With `server.preload_models`, loads the embedding model and checks its
///    dimension against the index before accepting requests
/// 4. Binds and serves with graceful shutdown
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .init();

    let addr: SocketAddr = config.server.socket_addr()?;

    let service = Arc::new(PaperService::from_config(&config).await?);
    if config.server.preload_models {
        service.verify().await?;
    }

    let app = build_router(AppState::new(service), &config.server);

    tracing::info!(
        %addr,
        index = %config.redis.index_name,
        model = %config.embedding.model,
        timeout_secs = config.server.timeout_secs,
        cors = config.server.enable_cors,
        "starting paper-vss server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
