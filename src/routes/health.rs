use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Health check endpoint - lightweight, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness check: DB reachable within 5s and not shutting down
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: shutting down").into_response();
    }
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_snapshot();
    Json(snapshot)
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let series: [(&str, &str, &str, u64); 9] = [
        ("cloudindex_syncs_started", "counter", "Sync jobs started", m.syncs_started),
        ("cloudindex_syncs_completed", "counter", "Sync jobs completed", m.syncs_completed),
        ("cloudindex_syncs_failed", "counter", "Sync jobs failed", m.syncs_failed),
        ("cloudindex_syncs_rejected", "counter", "Sync triggers rejected as busy", m.syncs_rejected),
        ("cloudindex_nodes_written", "counter", "Nodes written by syncs", m.nodes_written),
        ("cloudindex_nodes_tombstoned", "counter", "Nodes tombstoned by syncs", m.nodes_tombstoned),
        ("cloudindex_session_refreshes", "counter", "Successful session refreshes", m.session_refreshes),
        ("cloudindex_session_failures", "counter", "Failed session refreshes", m.session_failures),
        ("cloudindex_uptime_seconds", "gauge", "Uptime seconds", m.uptime_seconds),
    ];
    let mut body = String::new();
    for (name, kind, help, value) in series {
        body.push_str(&format!("# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n"));
    }
    body.push_str(&format!(
        "# HELP cloudindex_jobs_running Jobs currently running\n# TYPE cloudindex_jobs_running gauge\ncloudindex_jobs_running {}\n",
        state.guard.running_count()
    ));
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
