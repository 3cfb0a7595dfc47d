//! Inbound contract for chat connectors (Twitch, Discord, overlays...).
//!
//! A connector posts the normalized envelope and gets the reply back in the
//! response. The same reply is also fanned out to the dispatch targets, so
//! a connector may either use the response or register a webhook target.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use rk_domain::{InboundMeta, Role};

use super::api_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    /// Connector name: `"twitch"`, `"discord"`, ...
    pub platform: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Platform message ID to thread the reply under.
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    pub text: String,
}

impl InboundEnvelope {
    fn meta(&self) -> InboundMeta {
        InboundMeta {
            platform: self.platform.clone(),
            user: self.user.clone(),
            channel: self.channel.clone(),
            reply_to: self.reply_to.clone(),
            role: self.role,
        }
    }
}

/// `POST /inbound`
pub async fn inbound(State(state): State<AppState>, Json(envelope): Json<InboundEnvelope>) -> Response {
    let text = envelope.text.trim();
    if text.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "Missing text");
    }
    let meta = envelope.meta();
    tracing::info!(platform = %meta.platform, user = ?meta.user, "inbound message");

    let response = state.brain.handle_input(text, &meta).await;
    Json(serde_json::json!({ "response": response })).into_response()
}
