//! # CEMS Portal HTTP API Module
//!
//! This module implements the JSON API of the registration wizard using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Registry row counts
//! - `POST /sessions` - Start a wizard session on the login page
//! - `GET /sessions/{id}` - Render the current page of a session
//! - `POST /sessions/{id}/otp` - Send OTP
//! - `POST /sessions/{id}/otp/verify` - Verify OTP
//! - `POST /sessions/{id}/industry` - Submit Industry Details
//! - `POST /sessions/{id}/stack` - Submit Stack Details
//! - `POST /sessions/{id}/parameters` - Select instrument parameters
//! - `POST /sessions/{id}/instruments` - Submit one parameter sub-form
//! - `POST /sessions/{id}/complete` - Complete CEMS Details
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `CEMS_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `CEMS_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)

mod handlers;
mod middleware;
mod sessions;
mod types;

pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use sessions::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL, SessionEntry, SessionRegistry};
pub use types::{ActionResponse, HealthResponse, SessionResponse, StatusResponse};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use cems_core::{CemsError, CodeSource, RandomCodes, RegistryStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body (256 KiB). Forms are small.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// The registry as shared by every request.
pub type DynStore = dyn RegistryStore + Send + Sync;

/// Shared server state: the store, the session registry and the OTP source.
///
/// Lock order is sessions, then store, then codes. `codes` is a blocking
/// mutex and is only taken inside synchronous page handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Box<DynStore>>>,
    pub sessions: Arc<RwLock<SessionRegistry>>,
    pub codes: Arc<Mutex<Box<dyn CodeSource + Send>>>,
    /// Global requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
}

impl AppState {
    /// Create app state over `store` with random OTP codes.
    #[must_use]
    pub fn new(store: impl RegistryStore + Send + Sync + 'static) -> Self {
        Self {
            store: Arc::new(RwLock::new(Box::new(store))),
            sessions: Arc::new(RwLock::new(SessionRegistry::default())),
            codes: Arc::new(Mutex::new(Box::new(RandomCodes))),
            rate_limit: 0,
        }
    }

    /// Replace the OTP source.
    #[must_use]
    pub fn with_codes(mut self, codes: impl CodeSource + Send + 'static) -> Self {
        self.codes = Arc::new(Mutex::new(Box::new(codes)));
        self
    }

    /// Replace the session registry with one expiring idle sessions after
    /// `ttl` and holding at most `max_sessions`.
    #[must_use]
    pub fn with_session_limits(mut self, ttl: Duration, max_sessions: usize) -> Self {
        self.sessions = Arc::new(RwLock::new(SessionRegistry::new(ttl, max_sessions)));
        self
    }

    /// Set the global rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `CEMS_CORS_ORIGINS`:
/// - "*": allows all origins
/// - not set: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("CEMS_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins (CEMS_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in CEMS_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => build_localhost_cors(),
    }
}

/// CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/sessions", post(handlers::create_session_handler))
        .route("/sessions/{id}", get(handlers::get_session_handler))
        .route("/sessions/{id}/otp", post(handlers::send_otp_handler))
        .route("/sessions/{id}/otp/verify", post(handlers::verify_otp_handler))
        .route("/sessions/{id}/industry", post(handlers::industry_handler))
        .route("/sessions/{id}/stack", post(handlers::stack_handler))
        .route("/sessions/{id}/parameters", post(handlers::parameters_handler))
        .route("/sessions/{id}/instruments", post(handlers::instrument_handler))
        .route("/sessions/{id}/complete", post(handlers::complete_handler));

    if state.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", state.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(state.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), CemsError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CemsError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("CEMS portal listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CemsError::IoError(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
