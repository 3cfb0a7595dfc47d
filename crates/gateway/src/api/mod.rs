pub mod auth;
pub mod generate;
pub mod health;
pub mod inbound;
pub mod logs;
pub mod memory;
pub mod model;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// `/health` is public; everything else sits behind the bearer-token
/// middleware (a no-op when no token is configured).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        // Conversation
        .route("/generate", post(generate::generate))
        .route("/inbound", post(inbound::inbound))
        // Memory
        .route("/memory", get(memory::list))
        .route("/memory/clear", post(memory::clear))
        .route("/memory/search", get(memory::search))
        .route("/memory/long_term/clear", post(memory::clear_long_term))
        // Operations
        .route("/logs", get(logs::logs))
        .route("/restart", post(model::restart))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}
