use std::sync::Arc;

use rk_domain::config::Config;

use crate::brain::Brain;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub brain: Arc<Brain>,
    /// SHA-256 of the API bearer token; `None` disables auth (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
}
