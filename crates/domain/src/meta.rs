//! Routing metadata that accompanies every inbound message.

use serde::{Deserialize, Serialize};

use crate::turn::Role;

/// Metadata delivered by a front-end alongside the message text.
///
/// `platform` tags the origin (`"twitch"`, `"discord"`, `"http"`, `"cli"`);
/// the remaining fields carry enough identity for a dispatch target to route
/// a reply back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMeta {
    #[serde(default = "d_platform")]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Platform message ID to reply to, if the platform supports threading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Overrides the role of the inbound turn (defaults to user).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl InboundMeta {
    pub fn for_platform(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

fn d_platform() -> String {
    "unknown".into()
}
