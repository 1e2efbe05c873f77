//! HTTP API gateway for StudyKit.
//!
//! Exposes the REST surface for sessions, document upload, study
//! requests, answer submission, and progress, nested under `/v1`.
//!
//! Built on Axum. Identity arrives as `Authorization: Bearer <user-id>`
//! (verified upstream; the gateway trusts the subject) and the tier flag
//! as `X-User-Tier`.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use studykit_config::AppConfig;
use studykit_core::model::ModelBackend;
use studykit_core::store::{ProgressStore, SessionStore};
use studykit_index::InMemoryIndex;
use studykit_orchestrator::StudyService;
use studykit_providers::OpenAiBackend;
use studykit_store::{MemoryStore, SqliteStore};

/// How often the expiry sweeper runs.
const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the configured origin
/// - Request body limit aligned with the upload cap
/// - In-memory sliding-window rate limiting (`/health` exempt)
/// - HTTP trace logging
pub fn build_router(service: Arc<StudyService>, config: &AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::exact(
            config
                .gateway
                .allowed_origin
                .parse()
                .unwrap_or_else(|_| axum::http::HeaderValue::from_static("http://localhost:8080")),
        ))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("x-user-tier"),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    let rate_limiter = Arc::new(RateLimiter::new(
        config.gateway.rate_limit_per_minute,
        std::time::Duration::from_secs(60),
    ));

    // Slack over the upload cap lets the service report size_exceeded as
    // structured JSON instead of axum's bare 413.
    let body_limit = config.ingest.max_file_size + 1024;

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(service))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the store per config, wires the service, and spawns a
/// background sweep for expired free-tier sessions.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let addr = format!("{host}:{port}");

    let (session_store, progress_store): (Arc<dyn SessionStore>, Arc<dyn ProgressStore>) =
        match config.store.backend.as_str() {
            "memory" => {
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
            _ => {
                let store = Arc::new(SqliteStore::new(&config.store.path).await?);
                (store.clone(), store)
            }
        };
    info!(backend = %session_store.name(), "Store ready");

    let backend: Arc<dyn ModelBackend> = Arc::new(OpenAiBackend::from_config(&config.model));
    let index = Arc::new(InMemoryIndex::new());
    let service = Arc::new(StudyService::new(
        &config,
        session_store,
        progress_store,
        index,
        backend,
    ));

    let sweeper = service.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            match sweeper.sweep_expired().await {
                Ok(0) => {}
                Ok(swept) => info!(swept, "Removed expired sessions"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    });

    let app = build_router(service, &config);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (bearer identity or
/// "anonymous"). Thread-safe via `std::sync::Mutex`, held briefly.
struct RateLimiter {
    max_requests: usize,
    window: std::time::Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: std::time::Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Evict stale entries when the map grows large
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rate limiting middleware keyed on the Authorization header, falling
/// back to "anonymous". Returns 429 when exceeded. `/health` is exempt
/// so monitoring can poll it freely.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Health ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
