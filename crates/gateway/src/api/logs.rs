use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use super::api_error;
use crate::state::AppState;

const DEFAULT_LINES: usize = 100;

/// Last `n` newline-separated segments of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// `GET /logs?lines=N`: tail of the server log file as plain text.
///
/// `lines` falls back to 100 when absent, zero or not a number.
pub async fn logs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let lines = params
        .get("lines")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LINES);

    let path = state.config.logging.file_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            tail_lines(&text, lines),
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            api_error(StatusCode::NOT_FOUND, "Log file not found")
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "reading log file failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch logs")
        }
    }
}
