use rk_domain::config::{Config, ConfigSeverity, VoiceEngine, WebhookKind};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
}

#[test]
fn default_memory_capacity_is_twenty() {
    let config = Config::default();
    assert_eq!(config.memory.capacity, 20);
    assert!(!config.memory.persist_turns);
    assert_eq!(config.memory.persona, "Reka");
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
[server]
port = 4000

[model]
command = "/opt/llama/llama-cli"
model_path = "/models/m.gguf"
response_timeout_ms = 15000

[model.completion]
strategy = "punctuation"

[memory]
capacity = 3
persist_turns = true

[voice]
enabled = true
engine = "piper"
voice = "en_US-amy-medium.onnx"

[[dispatch.targets]]
name = "discord"
url = "http://localhost:9000/reply"
platforms = ["discord"]

[[dispatch.targets]]
name = "obs"
kind = "overlay"
url = "http://localhost:9001/overlay"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.model.response_timeout_ms, 15_000);
    assert_eq!(config.memory.capacity, 3);
    assert_eq!(config.voice.engine, VoiceEngine::Piper);
    assert_eq!(config.dispatch.targets.len(), 2);
    assert_eq!(config.dispatch.targets[0].kind, WebhookKind::ChatReply);
    assert_eq!(config.dispatch.targets[1].kind, WebhookKind::Overlay);
    assert_eq!(config.dispatch.timeout_ms, 5000);
}

#[test]
fn zero_capacity_is_an_error() {
    let mut config = Config::default();
    config.memory.capacity = 0;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "memory.capacity" && i.severity == ConfigSeverity::Error));
}

#[test]
fn empty_target_url_is_an_error() {
    let toml_str = r#"
[[dispatch.targets]]
name = "broken"
url = ""
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "dispatch.targets[0].url" && i.severity == ConfigSeverity::Error));
}

#[test]
fn default_config_has_no_errors() {
    let config = Config::default();
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn out_of_range_sample_rate_is_an_error() {
    let mut config = Config::default();
    config.observability.sample_rate = 1.5;
    assert!(config
        .validate()
        .iter()
        .any(|i| i.field == "observability.sample_rate" && i.severity == ConfigSeverity::Error));
}
