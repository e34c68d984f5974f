//! HTTP route handlers and router assembly.
//!
//! - `health`: liveness, readiness, metrics and version
//! - `accounts`: account status, SSE events and admin sync triggers
//! - `browse`: listings, search and downloads

pub mod accounts;
pub mod browse;
pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::middleware;
use crate::state::AppState;

// Compression breaks live SSE streams
#[derive(Clone)]
struct NoSseDefault(DefaultPredicate);

impl Predicate for NoSseDefault {
    fn should_compress<B: axum::body::HttpBody>(&self, res: &axum::http::Response<B>) -> bool {
        let is_sse = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|s| s.starts_with("text/event-stream"));
        !is_sse && self.0.should_compress(res)
    }
}

/// Full application router with the middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let limiter = state.rate_limiter.clone();

    let admin = Router::new()
        .route("/api/admin/accounts/{id}/sync", post(accounts::trigger_sync))
        .route("/api/admin/accounts/{id}/refresh", post(accounts::trigger_refresh))
        .route("/api/admin/accounts/{id}/cookie", post(accounts::trigger_cookie))
        .route("/api/admin/sync-all", post(accounts::sync_all))
        .route("/api/admin/refresh-cookies", post(accounts::refresh_all_cookies))
        .route_layer(from_fn_with_state(cfg.clone(), middleware::auth::admin_auth_middleware));

    let hotlinkable = Router::new()
        .route("/api/accounts/{id}/list", get(browse::get_listing))
        .route("/api/accounts/{id}/download", get(browse::download))
        .route_layer(from_fn_with_state(
            middleware::referrer::ReferrerPolicy::from_config(&cfg),
            middleware::referrer::referrer_middleware,
        ));

    let app = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/api/accounts", get(accounts::list_accounts))
        .route("/api/accounts/{id}/search", get(browse::search))
        .route("/api/accounts/{id}/events", get(accounts::account_events))
        .merge(hotlinkable)
        .merge(admin)
        .route_layer(from_fn_with_state(limiter, middleware::rate_limit::endpoint_limit_middleware))
        .with_state(state)
        .layer(DefaultBodyLimit::max(middleware::validation::max_body_size()))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new().compress_when(NoSseDefault(DefaultPredicate::new())))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware));

    // Permissive CORS only for local development against a separate UI
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
