mod dispatch;
mod logging;
mod memory;
mod model;
mod observability;
mod server;
mod voice;

pub use dispatch::*;
pub use logging::*;
pub use memory::*;
pub use model::*;
pub use observability::*;
pub use server::*;
pub use voice::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process configuration, built once at startup and handed to each
/// component's constructor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for configuration validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Any issue with
    /// [`ConfigSeverity::Error`] is fatal at startup.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if self.model.command.is_empty() {
            errors.push(ConfigError::error("model.command", "command must not be empty"));
        }
        if self.model.model_path.as_os_str().is_empty() {
            errors.push(ConfigError::error("model.model_path", "model_path must not be empty"));
        } else if !self.model.model_path.exists() {
            errors.push(ConfigError::warning(
                "model.model_path",
                format!("{} does not exist yet", self.model.model_path.display()),
            ));
        }
        if self.model.load_timeout_ms == 0 {
            errors.push(ConfigError::error("model.load_timeout_ms", "must be greater than 0"));
        }
        if self.model.response_timeout_ms == 0 {
            errors.push(ConfigError::error("model.response_timeout_ms", "must be greater than 0"));
        }
        if self.model.ready_markers.is_empty() {
            errors.push(ConfigError::error(
                "model.ready_markers",
                "at least one readiness marker is required",
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            errors.push(ConfigError::warning(
                "model.temperature",
                "temperature outside 0.0 - 2.0",
            ));
        }
        if self.model.completion.strategy == CompletionStrategy::Marker
            && self.model.completion.instruction_marker.is_empty()
        {
            errors.push(ConfigError::error(
                "model.completion.instruction_marker",
                "marker strategy needs a non-empty instruction_marker",
            ));
        }

        if self.memory.capacity == 0 {
            errors.push(ConfigError::error("memory.capacity", "capacity must be at least 1"));
        }

        if self.voice.enabled && self.voice.engine == VoiceEngine::None {
            errors.push(ConfigError::warning(
                "voice.engine",
                "voice is enabled but engine is \"none\"; nothing will be spoken",
            ));
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                errors.push(ConfigError::warning(
                    "server.rate_limit",
                    "requests_per_second and burst_size must be > 0; rate limiting will be skipped",
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        for (i, target) in self.dispatch.targets.iter().enumerate() {
            if target.name.is_empty() {
                errors.push(ConfigError::error(
                    format!("dispatch.targets[{i}].name"),
                    "target name must not be empty",
                ));
            }
            if target.url.is_empty() {
                errors.push(ConfigError::error(
                    format!("dispatch.targets[{i}].url"),
                    "target url must not be empty",
                ));
            }
        }

        errors
    }
}
