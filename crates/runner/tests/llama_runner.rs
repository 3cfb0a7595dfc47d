//! Drives `LlamaRunner` against small shell scripts standing in for the
//! inference CLI.

use std::time::{Duration, Instant};

use rk_domain::config::ModelConfig;
use rk_runner::{Completion, InferenceRequest, LlamaRunner, ModelBackend, RunnerError, RunnerState};

const READY: &str = "echo 'llama_model_load: loading model from stub' >&2";

fn stub(script: &str) -> ModelConfig {
    ModelConfig {
        command: "sh".into(),
        args: Some(vec!["-c".into(), script.into()]),
        load_timeout_ms: 5_000,
        response_timeout_ms: 5_000,
        ..ModelConfig::default()
    }
}

fn runner(config: ModelConfig) -> LlamaRunner {
    LlamaRunner::new(config, "Reka").unwrap()
}

/// Replies `reply` every time a full prompt has been read.
fn replying(reply: &str) -> String {
    format!(
        r#"{READY}; while read -r line; do case "$line" in Assistant:*) printf '%s' '{reply}';; esac; done"#
    )
}

#[tokio::test]
async fn start_waits_for_readiness_marker() {
    let r = runner(stub(&format!("{READY}; exec cat > /dev/null")));
    r.start().await.unwrap();
    assert_eq!(r.state(), RunnerState::Ready);
    r.close().await;
}

#[tokio::test]
async fn missing_readiness_marker_times_out() {
    let mut config = stub("exec sleep 5");
    config.load_timeout_ms = 200;
    let r = runner(config);

    let started = Instant::now();
    let err = r.start().await.unwrap_err();
    assert!(matches!(err, RunnerError::ModelLoadTimeout { waited_ms: 200 }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(r.state(), RunnerState::Unstarted);
}

#[tokio::test]
async fn process_exiting_during_load_is_a_process_error() {
    let r = runner(stub("echo 'model file not found' >&2; exit 1"));
    let err = r.start().await.unwrap_err();
    assert!(matches!(err, RunnerError::ModelProcess(_)), "{err}");
    assert_eq!(r.state(), RunnerState::Unstarted);
}

#[tokio::test]
async fn reply_completes_on_end_marker() {
    let script = format!(
        r#"{READY}; while read -r line; do case "$line" in Assistant:*) printf 'Hello there. [/INST]'; sleep 0.2; printf '</s>\n> ';; esac; done"#
    );
    let r = runner(stub(&script));

    let generation = r.generate(&InferenceRequest::new("hi")).await.unwrap();
    assert_eq!(generation.text, "Hello there.");
    assert_eq!(generation.completion, Completion::EndMarker);
    assert_eq!(r.state(), RunnerState::Ready);

    // The same process serves the next turn.
    let again = r.generate(&InferenceRequest::new("again")).await.unwrap();
    assert_eq!(again.text, "Hello there.");
    r.close().await;
}

#[tokio::test]
async fn reply_is_cleaned_and_punctuated() {
    let r = runner(stub(&replying("[/INST] Assistant: nice to meet you</s>")));
    let generation = r.generate(&InferenceRequest::new("hello")).await.unwrap();
    assert_eq!(generation.text, "nice to meet you.");
    r.close().await;
}

#[tokio::test]
async fn never_completing_reply_resolves_with_fallback() {
    let mut config = stub(&replying("thinking"));
    config.response_timeout_ms = 300;
    let fallback = config.fallback_reply.clone();
    let r = runner(config);
    r.start().await.unwrap();

    let started = Instant::now();
    let generation = r.generate(&InferenceRequest::new("hi")).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(generation.text, fallback);
    assert_eq!(generation.completion, Completion::TimedOut);
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    // The process still working on the abandoned reply is gone.
    assert_eq!(r.state(), RunnerState::Unstarted);
    r.close().await;
}

#[tokio::test]
async fn late_reply_after_timeout_is_not_read_as_the_next_turn() {
    let script = format!(
        r#"{READY}
while read -r line; do
  case "$line" in
    *turn-one*) delay=0.6; tag=1;;
    *turn-two*) delay=0.1; tag=2;;
    Assistant:*) sleep "$delay"; printf '[/INST] Reply %s.</s>' "$tag";;
  esac
done"#
    );
    let mut config = stub(&script);
    config.response_timeout_ms = 400;
    let r = runner(config);

    let first = r.generate(&InferenceRequest::new("turn-one")).await.unwrap();
    assert_eq!(first.completion, Completion::TimedOut);

    let second = r.generate(&InferenceRequest::new("turn-two")).await.unwrap();
    assert_eq!(second.text, "Reply 2.");
    assert_eq!(second.completion, Completion::EndMarker);
    assert_eq!(r.state(), RunnerState::Ready);
    r.close().await;
}

#[tokio::test]
async fn stdout_closing_while_the_process_lives_is_reported_as_such() {
    let r = runner(stub(&format!("{READY}; read -r line; exec >&-; exec sleep 5")));

    let started = Instant::now();
    let err = r.generate(&InferenceRequest::new("hi")).await.unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, RunnerError::ModelProcess(_)), "{message}");
    assert!(message.contains("stdout closed"), "{message}");
    assert!(message.contains("still running"), "{message}");
    assert!(!message.contains("signal"), "{message}");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(r.state(), RunnerState::Failed);
    r.close().await;
}

#[tokio::test]
async fn crash_during_generation_then_respawn() {
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("crashed-once");
    let script = format!(
        r#"{READY}
if [ -f '{flag}' ]; then
  while read -r line; do case "$line" in Assistant:*) printf '[/INST] Back again.</s>';; esac; done
else
  touch '{flag}'
  read -r line
  exit 3
fi"#,
        flag = flag.display()
    );
    let r = runner(stub(&script));

    let err = r.generate(&InferenceRequest::new("hi")).await.unwrap_err();
    assert!(matches!(err, RunnerError::ModelProcess(_)), "{err}");
    assert_eq!(r.state(), RunnerState::Failed);

    let generation = r.generate(&InferenceRequest::new("hi again")).await.unwrap();
    assert_eq!(generation.text, "Back again.");
    assert_eq!(r.state(), RunnerState::Ready);
    r.close().await;
}

#[tokio::test]
async fn restart_respawns_lazily() {
    let r = runner(stub(&replying("[/INST] Fresh.</s>")));
    r.start().await.unwrap();
    r.restart().await.unwrap();
    assert_eq!(r.state(), RunnerState::Unstarted);

    let generation = r.generate(&InferenceRequest::new("hi")).await.unwrap();
    assert_eq!(generation.text, "Fresh.");
    r.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_final() {
    let r = runner(stub(&format!("{READY}; exec cat > /dev/null")));
    r.start().await.unwrap();

    r.close().await;
    r.close().await;
    assert_eq!(r.state(), RunnerState::Stopped);

    let err = r.generate(&InferenceRequest::new("hi")).await.unwrap_err();
    assert!(matches!(err, RunnerError::Closed));
    assert!(matches!(r.start().await, Err(RunnerError::Closed)));
}

#[tokio::test]
async fn close_interrupts_a_running_generation() {
    let mut config = stub(&format!("{READY}; exec cat > /dev/null"));
    config.response_timeout_ms = 3_000;
    let r = runner(config);
    r.start().await.unwrap();

    let req = InferenceRequest::new("hi");
    let (generated, close_took) = tokio::join!(r.generate(&req), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        r.close().await;
        started.elapsed()
    });

    assert!(close_took < Duration::from_secs(1), "{close_took:?}");
    assert!(matches!(generated, Err(RunnerError::Closed)), "{generated:?}");
    assert_eq!(r.state(), RunnerState::Stopped);
}

#[tokio::test]
async fn close_interrupts_a_loading_model() {
    let r = runner(stub("exec sleep 5"));

    let (started, close_took) = tokio::join!(r.start(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        r.close().await;
        started.elapsed()
    });

    assert!(close_took < Duration::from_secs(1), "{close_took:?}");
    assert!(matches!(started, Err(RunnerError::Closed)), "{started:?}");
    assert_eq!(r.state(), RunnerState::Stopped);
}

#[tokio::test]
async fn close_without_start() {
    let r = runner(ModelConfig::default());
    r.close().await;
    assert_eq!(r.state(), RunnerState::Stopped);
}
