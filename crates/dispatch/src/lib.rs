//! Dispatch Set: fans a generated reply out to every registered output
//! sink (chat replies, overlays, voice, embedding callbacks).
//!
//! Targets run one after another in registration order. A failing target
//! is logged and skipped; it never stops the remaining targets and never
//! reaches the caller.

pub mod func;
pub mod voice;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use rk_domain::config::DispatchConfig;
use rk_domain::error::Result;
use rk_domain::trace::TraceEvent;
use rk_domain::InboundMeta;

pub use func::FnTarget;
pub use voice::{CommandVoice, VoiceSynth, VoiceTarget};
pub use webhook::WebhookTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    ChatReply,
    Overlay,
    Voice,
    Custom,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::ChatReply => "chat_reply",
            TargetKind::Overlay => "overlay",
            TargetKind::Voice => "voice",
            TargetKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An output sink for generated replies.
#[async_trait]
pub trait DispatchTarget: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TargetKind;

    /// Deliver `text`. Targets that do not serve `meta.platform` return
    /// `Ok(())` without doing anything.
    async fn send(&self, text: &str, meta: &InboundMeta) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DispatcherSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered collection of dispatch targets. Cloning shares the targets.
#[derive(Clone, Default)]
pub struct DispatcherSet {
    targets: Vec<Arc<dyn DispatchTarget>>,
}

impl DispatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the webhook targets listed in `[[dispatch.targets]]`, in file
    /// order.
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut set = Self::new();
        for target in &config.targets {
            set.register(Arc::new(WebhookTarget::from_config(target, timeout)?));
        }
        Ok(set)
    }

    pub fn register(&mut self, target: Arc<dyn DispatchTarget>) {
        tracing::info!(target_name = target.name(), kind = %target.kind(), "registered dispatch target");
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name().to_owned()).collect()
    }

    /// Invoke every target in registration order, isolating failures.
    pub async fn send_all(&self, text: &str, meta: &InboundMeta) {
        for target in &self.targets {
            match target.send(text, meta).await {
                Ok(()) => {
                    tracing::debug!(target_name = target.name(), platform = %meta.platform, "dispatched reply");
                }
                Err(e) => {
                    tracing::warn!(target_name = target.name(), error = %e, "dispatch target failed");
                    TraceEvent::DispatchFailed {
                        target: target.name().to_owned(),
                        error: e.to_string(),
                    }
                    .emit();
                }
            }
        }
    }
}

impl std::fmt::Debug for DispatcherSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherSet").field("targets", &self.names()).finish()
    }
}
