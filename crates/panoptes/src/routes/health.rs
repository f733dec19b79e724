//! Health check endpoints.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    sessions: usize,
    outcome_sink: &'static str,
    enabled_kinds: usize,
    uptime_secs: u64,
}

/// Readiness: sessions served and where outcomes go
pub async fn ready_check(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        sessions: state.registry.len().await,
        outcome_sink: state.engine.sink.name(),
        enabled_kinds: state.engine.selector.kinds().len(),
        uptime_secs: state.uptime_secs(),
    })
}
