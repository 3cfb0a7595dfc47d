use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch targets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Webhook targets, registered in file order.
    #[serde(default)]
    pub targets: Vec<WebhookTargetConfig>,
    /// Per-request timeout for webhook targets.
    #[serde(default = "d_5000")]
    pub timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTargetConfig {
    pub name: String,
    #[serde(default = "d_kind")]
    pub kind: WebhookKind,
    pub url: String,
    /// Only deliver replies whose metadata platform is listed. Empty = all.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Env var holding an HMAC secret; when set the body is signed.
    #[serde(default)]
    pub secret_env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    ChatReply,
    Overlay,
}

fn d_kind() -> WebhookKind {
    WebhookKind::ChatReply
}
fn d_5000() -> u64 {
    5000
}
