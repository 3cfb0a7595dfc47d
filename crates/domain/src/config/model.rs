use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inference subprocess
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Launch parameters and deadlines for the local inference process.
///
/// Sampling parameters are fixed at launch; the process is long-lived and
/// is not restarted per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Inference executable. `LLAMA_CPP_PATH` overrides this at load time.
    #[serde(default = "d_command")]
    pub command: String,
    #[serde(default = "d_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "d_2048")]
    pub context_length: u32,
    #[serde(default = "d_8")]
    pub threads: u32,
    #[serde(default = "d_1")]
    pub gpu_layers: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_top_p")]
    pub top_p: f32,
    #[serde(default = "d_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "d_512")]
    pub max_tokens: u32,
    /// Appended verbatim after the generated argument list.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Replaces the generated argument list entirely (wrapper scripts).
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Deadline for a readiness marker to appear on stderr.
    #[serde(default = "d_30000")]
    pub load_timeout_ms: u64,
    /// Deadline for a complete reply; the fallback reply is returned after it.
    #[serde(default = "d_30000")]
    pub response_timeout_ms: u64,
    /// Substrings on the diagnostic stream that mean the model is loaded.
    #[serde(default = "d_ready_markers")]
    pub ready_markers: Vec<String>,
    /// Sent to the caller when the response deadline elapses.
    #[serde(default = "d_fallback_reply")]
    pub fallback_reply: String,
    /// Optional `token -> id` JSON vocabulary for token estimates.
    #[serde(default)]
    pub vocab_path: Option<PathBuf>,
    #[serde(default)]
    pub completion: CompletionConfig,
}

impl ModelConfig {
    /// Executable to spawn, honouring the `LLAMA_CPP_PATH` override.
    pub fn resolved_command(&self) -> String {
        match std::env::var("LLAMA_CPP_PATH") {
            Ok(path) if !path.is_empty() => path,
            _ => self.command.clone(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: d_command(),
            model_path: d_model_path(),
            context_length: 2048,
            threads: 8,
            gpu_layers: 1,
            temperature: d_temperature(),
            top_p: d_top_p(),
            repetition_penalty: d_repetition_penalty(),
            max_tokens: 512,
            extra_args: Vec::new(),
            args: None,
            load_timeout_ms: 30_000,
            response_timeout_ms: 30_000,
            ready_markers: d_ready_markers(),
            fallback_reply: d_fallback_reply(),
            vocab_path: None,
            completion: CompletionConfig::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the runner decides that streamed output forms a finished reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStrategy {
    /// Wait for the instruction-close marker, then an end marker.
    Marker,
    /// Finish at the first sentence terminator after the wrapper.
    Punctuation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "d_strategy")]
    pub strategy: CompletionStrategy,
    /// Text after this marker is the reply body.
    #[serde(default = "d_instruction_marker")]
    pub instruction_marker: String,
    /// Any of these after the body ends the reply.
    #[serde(default = "d_end_markers")]
    pub end_markers: Vec<String>,
    /// With the marker strategy, also accept a sentence terminator at the
    /// end of a chunk as the end of the reply.
    #[serde(default = "d_true")]
    pub punctuation_fallback: bool,
    /// Reply body length (approximate tokens) that forces completion.
    #[serde(default = "d_256")]
    pub max_reply_tokens: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            strategy: CompletionStrategy::Marker,
            instruction_marker: d_instruction_marker(),
            end_markers: d_end_markers(),
            punctuation_fallback: true,
            max_reply_tokens: 256,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_command() -> String {
    "llama-cli".into()
}
fn d_model_path() -> PathBuf {
    PathBuf::from("./models/mistral-7b-instruct-v0.2.Q4_K_M.gguf")
}
fn d_2048() -> u32 {
    2048
}
fn d_8() -> u32 {
    8
}
fn d_1() -> u32 {
    1
}
fn d_512() -> u32 {
    512
}
fn d_256() -> usize {
    256
}
fn d_temperature() -> f32 {
    0.7
}
fn d_top_p() -> f32 {
    0.9
}
fn d_repetition_penalty() -> f32 {
    1.1
}
fn d_30000() -> u64 {
    30_000
}
fn d_ready_markers() -> Vec<String> {
    vec![
        "llama_model_load: loading".into(),
        "build: ".into(),
        "prepared".into(),
    ]
}
fn d_fallback_reply() -> String {
    "I apologize, but I'm taking too long to respond. Please try again.".into()
}
fn d_strategy() -> CompletionStrategy {
    CompletionStrategy::Marker
}
fn d_instruction_marker() -> String {
    "[/INST]".into()
}
fn d_end_markers() -> Vec<String> {
    vec!["</s>".into(), "\n>".into(), "User:".into()]
}
fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_strategy_parses_lowercase() {
        let cfg: CompletionConfig = toml::from_str(r#"strategy = "punctuation""#).unwrap();
        assert_eq!(cfg.strategy, CompletionStrategy::Punctuation);
        assert_eq!(cfg.instruction_marker, "[/INST]");
    }

    #[test]
    fn model_defaults_match_launch_parameters() {
        let cfg: ModelConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.context_length, 2048);
        assert_eq!(cfg.threads, 8);
        assert_eq!(cfg.max_tokens, 512);
        assert_eq!(cfg.load_timeout_ms, 30_000);
        assert_eq!(cfg.ready_markers.len(), 3);
        assert_eq!(cfg.completion.strategy, CompletionStrategy::Marker);
    }
}
