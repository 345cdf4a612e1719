//! # tagstore HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Store and mirror status
//! - `GET /vocabulary` - Tag options and reference text
//! - `POST /tags` - Save a tag set (buffered)
//! - `GET /tags` - List committed records (`?uid=` for one user)
//! - `GET /tags/{image_id}` - Read one committed record
//! - `POST /tags/autosave` - Autosave tick (debounced)
//! - `POST /tags/flush` - Flush the caller's buffer
//! - `POST /flag` - Flag or reject an image
//! - `POST /offensive` - Report an offensive image
//! - `GET /counts` - Local and remote counts
//! - `POST /export` - Export the store (json, csv or failures)
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `TAGSTORE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `TAGSTORE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `TAGSTORE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::get_api_key_from_env;
pub use handlers::{
    autosave_handler, counts_handler, export_handler, flag_handler, flush_handler,
    get_tags_handler, health_handler, list_tags_handler, offensive_handler, save_handler,
    status_handler, vocabulary_handler,
};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    CountsQuery, CountsResponse, ExportRequest, ExportResponse, FlagRequest, FlagResponse,
    FlushRequest, FlushResponse, HealthResponse, OffensiveRequest, RecordResponse, RecordsQuery,
    RecordsResponse, SaveRequest, SaveResponse, StatusResponse, VocabularyResponse,
};

use crate::service::TagService;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tagstore_core::TagError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MiB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the tagging service.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TagService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: TagService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Origins a tagging UI is served from during local development.
const LOCAL_ORIGINS: [&str; 6] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://localhost:8501",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
    "http://127.0.0.1:8501",
];

/// CORS from `TAGSTORE_CORS_ORIGINS`: `*` for any origin, a comma-separated
/// list, or localhost only when unset or unusable.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("TAGSTORE_CORS_ORIGINS").ok().as_deref() {
        Some("*") => {
            tracing::warn!("CORS: any origin allowed (TAGSTORE_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(list) => {
            let origins = parse_origins(list.split(','));
            if origins.is_empty() {
                tracing::warn!("CORS: no valid origin in TAGSTORE_CORS_ORIGINS; localhost only");
                restricted_cors(parse_origins(LOCAL_ORIGINS))
            } else {
                restricted_cors(origins)
            }
        }
        None => {
            tracing::info!("CORS: localhost only");
            restricted_cors(parse_origins(LOCAL_ORIGINS))
        }
    }
}

fn parse_origins<'a>(origins: impl IntoIterator<Item = &'a str>) -> Vec<HeaderValue> {
    origins
        .into_iter()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = o, error = %e, "CORS: invalid origin ignored");
                None
            }
        })
        .collect()
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Router with every endpoint. Layers, outermost first: trace, CORS, body
/// limit, rate limit (unless `TAGSTORE_RATE_LIMIT=0`), API key (when set).
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key required for every endpoint but /health");
    } else {
        tracing::warn!("TAGSTORE_API_KEY not set; the API is open to any caller");
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/vocabulary", get(handlers::vocabulary_handler))
        .route(
            "/tags",
            post(handlers::save_handler).get(handlers::list_tags_handler),
        )
        .route("/tags/{image_id}", get(handlers::get_tags_handler))
        .route("/tags/autosave", post(handlers::autosave_handler))
        .route("/tags/flush", post(handlers::flush_handler))
        .route("/flag", post(handlers::flag_handler))
        .route("/offensive", post(handlers::offensive_handler))
        .route("/counts", get(handlers::counts_handler))
        .route("/export", post(handlers::export_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server; buffered records are flushed on Ctrl+C.
pub async fn run_server(addr: &str, service: TagService) -> Result<(), TagError> {
    let state = AppState::new(service);
    let service = Arc::clone(&state.service);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TagError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("tagstore HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TagError::IoError(format!("Server error: {}", e)))?;

    let summary = service.flush_all().await;
    tracing::info!(
        written = summary.written,
        retained = summary.retained,
        "Flushed pending tags on shutdown"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
