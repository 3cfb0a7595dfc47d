use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use rk_domain::InboundMeta;

use super::api_error;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub meta: Option<InboundMeta>,
}

/// `POST /generate`
///
/// Runs one turn and returns `{ "response": ... }`. The reply is always
/// present: generation failures are already masked by the brain. A missing
/// or unparsable body is treated the same as a missing `input`.
pub async fn generate(
    State(state): State<AppState>,
    payload: Option<Json<GenerateRequest>>,
) -> Response {
    let body = payload.map(|Json(body)| body).unwrap_or_default();
    let input = match body.input.as_deref().map(str::trim) {
        Some(input) if !input.is_empty() => input.to_owned(),
        _ => return api_error(StatusCode::BAD_REQUEST, "Missing input"),
    };
    let meta = body.meta.unwrap_or_else(|| InboundMeta::for_platform("http"));

    let response = state.brain.handle_input(&input, &meta).await;
    Json(serde_json::json!({ "response": response })).into_response()
}
