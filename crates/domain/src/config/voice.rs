use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Voice synthesis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_engine")]
    pub engine: VoiceEngine,
    /// Voice name (edge), model file (piper) or model name (coqui).
    #[serde(default = "d_voice")]
    pub voice: String,
    /// Overrides the engine's default executable name.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default = "d_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEngine {
    Edge,
    Piper,
    Coqui,
    None,
}

impl VoiceEngine {
    /// Executable invoked when no `binary` override is configured.
    pub fn default_binary(self) -> &'static str {
        match self {
            VoiceEngine::Edge => "edge-tts",
            VoiceEngine::Piper => "piper",
            VoiceEngine::Coqui => "coqui-tts",
            VoiceEngine::None => "",
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            engine: VoiceEngine::Edge,
            voice: d_voice(),
            binary: None,
            output_dir: d_output_dir(),
        }
    }
}

fn d_engine() -> VoiceEngine {
    VoiceEngine::Edge
}
fn d_voice() -> String {
    "en-US-AriaNeural".into()
}
fn d_output_dir() -> PathBuf {
    PathBuf::from("./data/tts")
}
