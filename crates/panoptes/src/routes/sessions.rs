//! Session endpoints. Every handler forwards to the session actor and returns
//! the resulting snapshot.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use argus_common::{ArgusError, SessionView};

use super::ApiError;
use crate::deterrence::ClientEvent;
use crate::scratch::PointerEvent;
use crate::session::Action;
use crate::state::AppState;

type SessionResult = Result<Json<SessionView>, ApiError>;

async fn dispatch(state: &AppState, id: &str, action: Action) -> SessionResult {
    let handle = state.registry.get(id).await?;
    Ok(Json(handle.apply(action).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSession {
    #[serde(default)]
    compact: bool,
}

/// Start a session and its first round
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSession>,
) -> Json<SessionView> {
    Json(state.registry.create(payload.compact).await)
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> SessionResult {
    dispatch(&state, &id, Action::Snapshot).await
}

/// Unmount: every timer the session owns is cancelled
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.registry.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ArgusError::SessionNotFound(id).into())
    }
}

pub async fn refresh(State(state): State<AppState>, Path(id): Path<String>) -> SessionResult {
    dispatch(&state, &id, Action::Refresh).await
}

pub async fn open_view(State(state): State<AppState>, Path(id): Path<String>) -> SessionResult {
    dispatch(&state, &id, Action::View).await
}

pub async fn dismiss(State(state): State<AppState>, Path(id): Path<String>) -> SessionResult {
    dispatch(&state, &id, Action::Dismiss).await
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    answer: String,
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AnswerRequest>,
) -> SessionResult {
    dispatch(&state, &id, Action::Submit { answer: payload.answer }).await
}

#[derive(Debug, Deserialize)]
pub struct DeviceReport {
    compact: bool,
}

/// Viewport changed; applies to the next round
pub async fn set_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<DeviceReport>,
) -> SessionResult {
    dispatch(&state, &id, Action::SetDevice { compact: payload.compact }).await
}

pub async fn report_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(event): Json<ClientEvent>,
) -> SessionResult {
    dispatch(&state, &id, Action::Client { event }).await
}

#[derive(Debug, Deserialize)]
pub struct PointerBatch {
    events: Vec<PointerEvent>,
}

pub async fn scratch_pointer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PointerBatch>,
) -> SessionResult {
    dispatch(&state, &id, Action::Pointer { events: payload.events }).await
}

pub async fn check_scratch(State(state): State<AppState>, Path(id): Path<String>) -> SessionResult {
    dispatch(&state, &id, Action::CheckScratch).await
}

#[derive(Debug, Serialize)]
pub struct SurfaceResponse {
    surface: String,
}

pub async fn scratch_surface(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SurfaceResponse>, ApiError> {
    let handle = state.registry.get(&id).await?;
    let surface = handle.surface().await?;
    Ok(Json(SurfaceResponse { surface }))
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::lifecycle::fakes;
    use crate::routes::create_router;
    use crate::state::AppState;
    use argus_common::{ChallengeKind, Phase, SessionView};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let (engine, _) = fakes::engine(&[ChallengeKind::CategoryImage, ChallengeKind::GlyphCode]);
        create_router(AppState::with_engine(AppConfig::default(), engine))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn ready_session(app: &Router) -> SessionView {
        let (status, body) = call(app, "POST", "/sessions", Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["session_id"].as_str().unwrap().to_string();
        wait_ready(app, &id).await
    }

    async fn wait_ready(app: &Router, id: &str) -> SessionView {
        for _ in 0..50 {
            let (_, body) = call(app, "GET", &format!("/sessions/{}", id), None).await;
            let view: SessionView = serde_json::from_value(body).unwrap();
            if view.phase != Phase::Loading {
                return view;
            }
            tokio::task::yield_now().await;
        }
        panic!("session never left loading");
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome_sink"], "memory");
        assert_eq!(body["enabled_kinds"], 2);
    }

    #[tokio::test]
    async fn test_view_flow() {
        let app = app();
        let view = ready_session(&app).await;
        assert!(view.can_view);
        assert!(view.media.is_none());
        let base = format!("/sessions/{}", view.session_id);

        let (status, body) = call(&app, "POST", &format!("{}/view", base), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "presenting");
        assert_eq!(body["seconds_remaining"], 5);
        assert!(body["media"].is_string());
        assert!(body.get("correct_answer").is_none());

        let (status, body) = call(&app, "POST", &format!("{}/view", base), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        // Answering while the window is open is rejected
        let answer = serde_json::json!({"answer": "4821"});
        let (status, _) = call(&app, "POST", &format!("{}/answer", base), Some(answer)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "POST", &format!("{}/dismiss", base), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "ready-unviewed");
        assert_eq!(body["has_been_viewed"], true);
        assert_eq!(body["can_view"], false);
    }

    #[tokio::test]
    async fn test_glyph_answer_gate() {
        let app = app();
        let mut view = ready_session(&app).await;
        let base = format!("/sessions/{}", view.session_id);

        // Two kinds alternate, so one refresh at most reaches the glyph round
        if view.kind != Some(ChallengeKind::GlyphCode) {
            call(&app, "POST", &format!("{}/refresh", base), None).await;
            view = wait_ready(&app, &view.session_id).await;
        }
        assert_eq!(view.kind, Some(ChallengeKind::GlyphCode));
        assert_eq!(view.code_length, Some(4));

        let short = serde_json::json!({"answer": "482"});
        let (status, body) = call(&app, "POST", &format!("{}/answer", base), Some(short)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Answer must be exactly 4 digits");

        let answer = serde_json::json!({"answer": "4821"});
        let (status, body) = call(&app, "POST", &format!("{}/answer", base), Some(answer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "answered-pending-refresh");
        assert_eq!(body["last_result"], true);
        assert_eq!(body["notice"]["kind"], "success");
    }

    #[tokio::test]
    async fn test_capture_violation_discards_round() {
        let app = app();
        let view = ready_session(&app).await;
        let base = format!("/sessions/{}", view.session_id);
        call(&app, "POST", &format!("{}/view", base), None).await;

        let event = serde_json::json!({"type": "context-menu"});
        let (status, body) = call(&app, "POST", &format!("{}/signals", base), Some(event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["round"], 2);
        assert_eq!(body["notice"]["kind"], "capture-warning");
    }

    #[tokio::test]
    async fn test_scratch_endpoints_need_scratch_round() {
        let app = app();
        let view = ready_session(&app).await;
        let base = format!("/sessions/{}", view.session_id);

        let batch = serde_json::json!({"events": [{"type": "down", "x": 10, "y": 10}]});
        let (status, _) = call(&app, "POST", &format!("{}/scratch", base), Some(batch)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "GET", &format!("{}/scratch/surface", base), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_and_deleted_sessions() {
        let app = app();
        let (status, _) = call(&app, "GET", "/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let view = ready_session(&app).await;
        let base = format!("/sessions/{}", view.session_id);

        let device = serde_json::json!({"compact": true});
        let (_, body) = call(&app, "POST", &format!("{}/device", base), Some(device)).await;
        assert_eq!(body["device"], "compact");

        let (status, _) = call(&app, "DELETE", &base, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "DELETE", &base, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", &base, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
