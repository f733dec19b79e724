//! HTTP route handlers for Panoptes.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use argus_common::ArgusError;

use crate::state::AppState;

mod health;
mod sessions;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.assets_dir);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Session lifecycle
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/{id}/refresh", post(sessions::refresh))
        .route("/sessions/{id}/view", post(sessions::open_view))
        .route("/sessions/{id}/dismiss", post(sessions::dismiss))
        .route("/sessions/{id}/answer", post(sessions::submit_answer))
        .route("/sessions/{id}/device", post(sessions::set_device))
        .route("/sessions/{id}/signals", post(sessions::report_signal))

        // Scratch surface
        .route("/sessions/{id}/scratch", post(sessions::scratch_pointer))
        .route("/sessions/{id}/scratch/check", post(sessions::check_scratch))
        .route("/sessions/{id}/scratch/surface", get(sessions::scratch_surface))

        // Glyph images and other static assets
        .nest_service("/assets", assets)

        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// `ArgusError` as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub ArgusError);

impl From<ArgusError> for ApiError {
    fn from(err: ArgusError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal details stay in the log
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
