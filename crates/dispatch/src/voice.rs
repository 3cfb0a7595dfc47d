//! Text-to-speech collaborators.
//!
//! Synthesis shells out to one of the supported command-line engines and
//! writes a WAV file under the configured output directory. Playback is
//! left to whatever consumes the file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use rk_domain::config::{VoiceConfig, VoiceEngine};
use rk_domain::error::{Error, Result};
use rk_domain::InboundMeta;

use crate::{DispatchTarget, TargetKind};

const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait VoiceSynth: Send + Sync {
    fn engine(&self) -> &str;

    /// Synthesize `text` and return the path of the audio file.
    async fn speak(&self, text: &str, meta: &InboundMeta) -> Result<PathBuf>;
}

/// Engine invocation: arguments plus optional text for stdin.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

pub struct CommandVoice {
    engine: VoiceEngine,
    binary: String,
    voice: String,
    output_dir: PathBuf,
}

impl CommandVoice {
    /// `None` when voice is disabled or the engine is `none`.
    pub fn from_config(cfg: &VoiceConfig) -> Option<Self> {
        if !cfg.enabled || cfg.engine == VoiceEngine::None {
            return None;
        }
        let binary = cfg
            .binary
            .clone()
            .unwrap_or_else(|| cfg.engine.default_binary().to_owned());
        Some(Self {
            engine: cfg.engine,
            binary,
            voice: cfg.voice.clone(),
            output_dir: cfg.output_dir.clone(),
        })
    }

    pub fn invocation(&self, text: &str, output: &Path) -> Invocation {
        let out = output.display().to_string();
        let (out, voice) = (out.as_str(), self.voice.as_str());
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match self.engine {
            VoiceEngine::Edge => Invocation {
                args: owned(&["speak", "--text", text, "--voice", voice, "--output", out]),
                stdin: None,
            },
            VoiceEngine::Piper => Invocation {
                args: owned(&["--model", voice, "--output_file", out]),
                stdin: Some(text.to_owned()),
            },
            VoiceEngine::Coqui => Invocation {
                args: owned(&["--text", text, "--out_path", out, "--model_name", voice]),
                stdin: None,
            },
            VoiceEngine::None => Invocation {
                args: Vec::new(),
                stdin: None,
            },
        }
    }

    async fn run(&self, invocation: Invocation, output: &Path) -> Result<()> {
        let mut child = tokio::process::Command::new(&self.binary)
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Voice(format!("spawn {}: {e}", self.binary)))?;

        if let (Some(text), Some(mut stdin)) = (invocation.stdin, child.stdin.take()) {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let out = child.wait_with_output().await?;
        let produced = tokio::fs::try_exists(output).await.unwrap_or(false);
        if out.status.success() && produced {
            return Ok(());
        }
        Err(Error::Voice(format!(
            "{} synthesis failed ({}): {}",
            self.engine(),
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )))
    }
}

#[async_trait]
impl VoiceSynth for CommandVoice {
    fn engine(&self) -> &str {
        match self.engine {
            VoiceEngine::Edge => "edge",
            VoiceEngine::Piper => "piper",
            VoiceEngine::Coqui => "coqui",
            VoiceEngine::None => "none",
        }
    }

    async fn speak(&self, text: &str, _meta: &InboundMeta) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output = self.output_dir.join(format!("tts_{}.wav", Uuid::new_v4().simple()));
        let invocation = self.invocation(text, &output);

        tokio::time::timeout(SYNTHESIS_TIMEOUT, self.run(invocation, &output))
            .await
            .map_err(|_| Error::Timeout(format!("{} synthesis", self.engine())))??;

        tracing::debug!(engine = self.engine(), path = %output.display(), "synthesized speech");
        Ok(output)
    }
}

/// Adapts a [`VoiceSynth`] into a dispatch target.
pub struct VoiceTarget {
    name: String,
    synth: Arc<dyn VoiceSynth>,
}

impl VoiceTarget {
    pub fn new(synth: Arc<dyn VoiceSynth>) -> Self {
        Self {
            name: format!("voice:{}", synth.engine()),
            synth,
        }
    }
}

#[async_trait]
impl DispatchTarget for VoiceTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Voice
    }

    async fn send(&self, text: &str, meta: &InboundMeta) -> Result<()> {
        self.synth.speak(text, meta).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(engine: VoiceEngine, binary: Option<&str>, dir: &Path) -> CommandVoice {
        let cfg = VoiceConfig {
            enabled: true,
            engine,
            voice: "en_US-amy".into(),
            binary: binary.map(str::to_owned),
            output_dir: dir.to_path_buf(),
        };
        CommandVoice::from_config(&cfg).unwrap()
    }

    #[test]
    fn disabled_or_none_engine_builds_nothing() {
        assert!(CommandVoice::from_config(&VoiceConfig::default()).is_none());
        let cfg = VoiceConfig {
            enabled: true,
            engine: VoiceEngine::None,
            ..VoiceConfig::default()
        };
        assert!(CommandVoice::from_config(&cfg).is_none());
    }

    #[test]
    fn engine_command_lines() {
        let dir = Path::new("/tmp/tts");
        let out = dir.join("tts_x.wav");

        let edge = voice(VoiceEngine::Edge, None, dir);
        assert_eq!(edge.binary, "edge-tts");
        assert_eq!(
            edge.invocation("hi", &out).args,
            ["speak", "--text", "hi", "--voice", "en_US-amy", "--output", "/tmp/tts/tts_x.wav"]
        );

        let piper = voice(VoiceEngine::Piper, Some("/opt/piper"), dir);
        assert_eq!(piper.binary, "/opt/piper");
        let inv = piper.invocation("hi", &out);
        assert_eq!(inv.args, ["--model", "en_US-amy", "--output_file", "/tmp/tts/tts_x.wav"]);
        assert_eq!(inv.stdin.as_deref(), Some("hi"));

        let coqui = voice(VoiceEngine::Coqui, None, dir);
        assert_eq!(
            coqui.invocation("hi", &out).args,
            ["--text", "hi", "--out_path", "/tmp/tts/tts_x.wav", "--model_name", "en_US-amy"]
        );
    }

    #[tokio::test]
    async fn failing_engine_reports_voice_error() {
        let dir = tempfile::tempdir().unwrap();
        let synth = voice(VoiceEngine::Coqui, Some("false"), dir.path());
        let err = synth.speak("hi", &InboundMeta::default()).await.unwrap_err();
        assert!(matches!(err, Error::Voice(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_binary_reports_voice_error() {
        let dir = tempfile::tempdir().unwrap();
        let synth = voice(VoiceEngine::Edge, Some("/nonexistent/edge-tts"), dir.path());
        let err = synth.speak("hi", &InboundMeta::default()).await.unwrap_err();
        assert!(matches!(err, Error::Voice(_)), "{err}");
    }
}
