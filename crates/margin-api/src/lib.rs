//! # margin-api
//!
//! HTTP surface for the margin highlight sync pipeline: Readwise fetch and
//! connection checks, validation, delivery to Mem, credential and schedule
//! storage, and anonymous usage stats.

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod telemetry;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use governor::{Quota, RateLimiter};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use uuid::Uuid;

use margin_core::defaults;

pub use config::ServerConfig;
pub use error::ApiError;
use services::{CredentialStore, KvStore, ScheduleStore, SyncStats};

/// Global rate limiter type (direct quota, no per-client bucketing).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub credentials: CredentialStore,
    pub schedules: ScheduleStore,
    pub stats: SyncStats,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(config: ServerConfig, kv: Arc<dyn KvStore>) -> Self {
        let rate_limiter = if config.rate_limit_enabled {
            build_rate_limiter(config.rate_limit_requests, config.rate_limit_period_secs)
        } else {
            None
        };
        Self {
            config: Arc::new(config),
            credentials: CredentialStore::new(kv.clone()),
            schedules: ScheduleStore::new(kv.clone()),
            stats: SyncStats::new(kv),
            rate_limiter,
        }
    }
}

fn build_rate_limiter(requests: u64, period_secs: u64) -> Option<Arc<GlobalRateLimiter>> {
    let burst = NonZeroU32::new(u32::try_from(requests).unwrap_or(u32::MAX));
    let quota = Quota::with_period(Duration::from_secs(period_secs));
    match (quota, burst) {
        (Some(quota), Some(burst)) => Some(Arc::new(RateLimiter::direct(quota.allow_burst(burst)))),
        _ => {
            warn!(
                requests,
                period_secs, "Rate limit must be non-zero, rate limiting disabled"
            );
            None
        }
    }
}

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router with all middleware.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    let max_body_size = state.config.max_body_size;

    Router::new()
        .route("/health", get(health_check))
        // Readwise
        .route("/api/readwise/fetch", post(handlers::readwise::fetch_highlights))
        .route("/api/readwise/test", post(handlers::readwise::test_connection))
        // Mem
        .route("/api/mem/test", post(handlers::mem::test_api_key))
        .route("/api/mem/create", post(handlers::mem::create_note))
        // Sync
        .route("/api/sync/validate", post(handlers::sync::validate_highlights))
        .route("/api/sync/execute", post(handlers::sync::execute))
        .route(
            "/api/sync/schedule",
            get(handlers::schedule::get_schedule).post(handlers::schedule::save_schedule),
        )
        // Storage
        .route(
            "/api/storage/save-credentials",
            post(handlers::storage::save_credentials),
        )
        .route(
            "/api/storage/get-credentials",
            get(handlers::storage::get_credentials),
        )
        .route("/api/stats", get(handlers::stats::get_stats))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS))
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
