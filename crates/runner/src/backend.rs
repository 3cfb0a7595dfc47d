//! The narrow interface the orchestrator talks to.
//!
//! [`crate::LlamaRunner`] drives a local CLI process; anything else that can
//! turn a prompt into a reply (an inference server, a test double) can
//! implement [`ModelBackend`] instead.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use rk_domain::config::ModelConfig;

use crate::error::RunnerError;
use crate::parser::Completion;

/// Lifecycle of a model backend.
///
/// `Failed` is entered when the process dies mid-generation; the next
/// `generate` call respawns it. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Unstarted,
    Loading,
    Ready,
    Generating,
    Failed,
    Terminating,
    Stopped,
}

impl RunnerState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerState::Unstarted => "unstarted",
            RunnerState::Loading => "loading",
            RunnerState::Ready => "ready",
            RunnerState::Generating => "generating",
            RunnerState::Failed => "failed",
            RunnerState::Terminating => "terminating",
            RunnerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            repetition_penalty: config.repetition_penalty,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

/// One prompt for the backend.
///
/// `LlamaRunner` fixes sampling parameters at launch, so only `max_tokens`
/// has an effect per request (it can shorten the reply, never lengthen it).
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub completion: Completion,
    pub duration: Duration,
}

impl Generation {
    pub fn timed_out(&self) -> bool {
        self.completion == Completion::TimedOut
    }
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Stable identifier used in logs.
    fn backend_id(&self) -> &str;

    fn state(&self) -> RunnerState;

    /// Bring the backend to `Ready`.
    async fn start(&self) -> Result<(), RunnerError>;

    /// Produce one reply. Never hangs: a reply that does not complete within
    /// the response deadline resolves with the fallback text.
    async fn generate(&self, request: &InferenceRequest) -> Result<Generation, RunnerError>;

    /// Drop the current process; the next `generate` starts a fresh one.
    async fn restart(&self) -> Result<(), RunnerError>;

    /// Terminate for good. Idempotent.
    async fn close(&self);
}
