use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use super::api_error;
use crate::state::AppState;

/// `POST /restart`
///
/// Drops the running model process. It is respawned by the next turn.
pub async fn restart(State(state): State<AppState>) -> Response {
    tracing::info!("model restart requested via API");
    match state.brain.restart_model().await {
        Ok(()) => Json(serde_json::json!({ "status": "restarting" })).into_response(),
        Err(e) => api_error(StatusCode::CONFLICT, e.to_string()),
    }
}
