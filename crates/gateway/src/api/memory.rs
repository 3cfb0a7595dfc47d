use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use super::api_error;
use crate::state::AppState;

/// `GET /memory`: the conversation buffer, oldest first.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let turns = state.brain.buffered_turns();
    Json(serde_json::json!({
        "count": turns.len(),
        "capacity": state.config.memory.capacity,
        "turns": turns,
    }))
}

/// `POST /memory/clear`
pub async fn clear(State(state): State<AppState>) -> impl IntoResponse {
    state.brain.clear_memory();
    Json(serde_json::json!({ "status": "cleared" }))
}

/// `POST /memory/long_term/clear`: forget the long-term log, file included.
pub async fn clear_long_term(State(state): State<AppState>) -> Response {
    match state.brain.clear_long_term() {
        Ok(()) => Json(serde_json::json!({ "status": "cleared" })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to clear long-term memory");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// `GET /memory/search?q=...`: case-sensitive substring search of the
/// long-term log.
pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    if query.q.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "Missing query");
    }
    let matches = state.brain.search_long_term(&query.q);
    Json(serde_json::json!({
        "query": query.q,
        "count": matches.len(),
        "matches": matches,
    }))
    .into_response()
}
