//! Backend driving the `llama.cpp` interactive CLI as a long-lived child
//! process.
//!
//! The process is spawned once with fixed sampling parameters and fed one
//! logical input line per generation. Three background tasks own its
//! streams:
//!
//! - **stdout** reader: forwards raw byte chunks over an mpsc channel to
//!   whichever generation is in flight (stale chunks are drained first).
//!   A turn that hits the response deadline takes its process with it, so
//!   a late reply can never be read as the next turn's answer.
//! - **stderr** reader: logs diagnostic lines, keeps a short tail for error
//!   messages and signals readiness on the first configured marker.
//! - **waiter**: owns the `Child`, kills it on request (or when the session
//!   is dropped) and publishes the exit code on a watch channel.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;

use rk_domain::config::ModelConfig;
use rk_domain::trace::TraceEvent;
use rk_domain::Error;

use crate::backend::{Generation, InferenceRequest, ModelBackend, RunnerState};
use crate::error::RunnerError;
use crate::parser::{ansi_pattern, Completion, CompletionParser, Finished};
use crate::tokenizer::Tokenizer;

/// Primes interactive mode so the first real prompt is not the first turn.
const BOOTSTRAP_PROMPT: &str = "Hello\nAssistant: Hi! I am ready to help.\n";

const STDERR_TAIL_LINES: usize = 20;
const READ_CHUNK: usize = 4096;
const OUTPUT_CHANNEL: usize = 256;

/// How long a closed stdin is given to end the process before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Child process status as published by the waiter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    Running,
    Exited(Option<i32>),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One spawned process and the channels to its background tasks.
///
/// Dropping a session drops the kill sender, which makes the waiter task
/// kill the child.
struct Session {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    output: mpsc::Receiver<Vec<u8>>,
    events: watch::Receiver<ProcessEvent>,
    kill: Option<oneshot::Sender<()>>,
    stderr_tail: Arc<parking_lot::Mutex<VecDeque<String>>>,
}

impl Session {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "model stdin already closed")
        })?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    /// Discard output left over from a previous (possibly abandoned) turn.
    fn drain_stale(&mut self) -> usize {
        let mut bytes = 0;
        while let Ok(chunk) = self.output.try_recv() {
            bytes += chunk.len();
        }
        bytes
    }

    fn exit_status(&self) -> Option<Option<i32>> {
        match *self.events.borrow() {
            ProcessEvent::Exited(code) => Some(code),
            ProcessEvent::Running => None,
        }
    }

    fn stderr_tail(&self) -> String {
        let tail = self.stderr_tail.lock();
        tail.iter().cloned().collect::<Vec<_>>().join(" | ")
    }

    /// Close stdin and wait for the process to leave on its own, killing it
    /// after `grace`.
    async fn shutdown(mut self, grace: Duration) -> Option<i32> {
        drop(self.stdin.take());
        if let Some(code) = wait_exit(&mut self.events, grace).await {
            return code;
        }
        tracing::warn!(pid = ?self.pid, "model process did not exit within grace period, killing");
        self.kill_now().await.flatten()
    }

    /// `None` when the process still had not exited after `KILL_WAIT`.
    async fn kill_now(mut self) -> Option<Option<i32>> {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        wait_exit(&mut self.events, KILL_WAIT).await
    }
}

/// Resolves with the exit code once the waiter task publishes it.
async fn exited(events: &mut watch::Receiver<ProcessEvent>) -> Option<i32> {
    loop {
        let current = *events.borrow_and_update();
        if let ProcessEvent::Exited(code) = current {
            return code;
        }
        if events.changed().await.is_err() {
            // Waiter is gone without publishing; treat as an unknown exit.
            return None;
        }
    }
}

async fn wait_exit(events: &mut watch::Receiver<ProcessEvent>, limit: Duration) -> Option<Option<i32>> {
    tokio::time::timeout(limit, exited(events)).await.ok()
}

/// `None` means no exit was observed: the process is still running.
fn describe_exit(status: Option<Option<i32>>) -> String {
    match status {
        Some(Some(code)) => format!("exited with exit code {code}"),
        Some(None) => "was terminated by a signal".into(),
        None => "is still running".into(),
    }
}


// ── background tasks ────────────────────────────────────────────────

async fn read_stdout(mut stdout: ChildStdout, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "model stdout read failed");
                break;
            }
        }
    }
}

async fn read_stderr(
    stderr: ChildStderr,
    markers: Vec<String>,
    ready: oneshot::Sender<()>,
    tail: Arc<parking_lot::Mutex<VecDeque<String>>>,
) {
    let mut ready = Some(ready);
    let mut reader = BufReader::new(stderr);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw).trim_end().to_owned();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(target: "rk_runner::model", line = %line, "model stderr");

                let is_ready = markers
                    .iter()
                    .any(|m| !m.is_empty() && line.contains(m.as_str()));
                if is_ready {
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(());
                    }
                }

                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                tracing::debug!(error = %e, "model stderr read failed");
                break;
            }
        }
    }
}

async fn wait_child(mut child: Child, kill: oneshot::Receiver<()>, events: watch::Sender<ProcessEvent>) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "failed to signal model process");
            }
            child.wait().await
        }
    };
    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(error = %e, "error waiting for model process");
            None
        }
    };
    tracing::info!(code = ?code, "model process exited");
    let _ = events.send(ProcessEvent::Exited(code));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum TurnOutcome {
    Done(Finished),
    TimedOut,
    Exited(Option<i32>),
    /// stdout reached EOF but the process did not exit.
    OutputClosed,
    WriteFailed(std::io::Error),
    Closed,
}

enum LoadOutcome {
    Ready,
    Exited,
    Closed,
}

pub struct LlamaRunner {
    config: ModelConfig,
    persona: String,
    tokenizer: Arc<Tokenizer>,
    ansi: Regex,
    /// Held for the whole of a start or generation; one prompt at a time.
    session: Mutex<Option<Session>>,
    state: parking_lot::Mutex<RunnerState>,
    /// Cancelled by `close` before it queues for `session`, so an in-flight
    /// start or generation gives the lock up at once.
    closing: CancellationToken,
}

impl LlamaRunner {
    pub fn new(config: ModelConfig, persona: impl Into<String>) -> Result<Self, Error> {
        let tokenizer = match &config.vocab_path {
            Some(path) => Tokenizer::load(path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "vocabulary unavailable, estimating length by words");
                Tokenizer::empty()
            }),
            None => Tokenizer::empty(),
        };
        let ansi = ansi_pattern().map_err(|e| Error::Config(format!("escape pattern: {e}")))?;
        Ok(Self {
            config,
            persona: persona.into(),
            tokenizer: Arc::new(tokenizer),
            ansi,
            session: Mutex::new(None),
            state: parking_lot::Mutex::new(RunnerState::Unstarted),
            closing: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn is_closed(&self) -> bool {
        self.closing.is_cancelled() || self.state() == RunnerState::Stopped
    }

    fn set_state(&self, next: RunnerState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "model runner state");
            *state = next;
        }
    }

    /// Launch arguments: the configured override, or the llama.cpp CLI flags.
    pub fn launch_args(&self) -> Vec<String> {
        if let Some(args) = &self.config.args {
            return args.clone();
        }
        let c = &self.config;
        let mut args = vec![
            "-m".to_owned(),
            c.model_path.display().to_string(),
            "-c".to_owned(),
            c.context_length.to_string(),
            "-t".to_owned(),
            c.threads.to_string(),
            "-ngl".to_owned(),
            c.gpu_layers.to_string(),
            "--temp".to_owned(),
            c.temperature.to_string(),
            "--repeat-penalty".to_owned(),
            c.repetition_penalty.to_string(),
            "-n".to_owned(),
            c.max_tokens.to_string(),
            "--top-p".to_owned(),
            c.top_p.to_string(),
            "-i".to_owned(),
            "--prompt".to_owned(),
            BOOTSTRAP_PROMPT.to_owned(),
        ];
        args.extend(c.extra_args.iter().cloned());
        args
    }

    /// Wrap `prompt` in the system preamble as one logical input line.
    ///
    /// Interactive llama.cpp treats a trailing backslash as a line
    /// continuation, so embedded newlines become `\` + newline and only the
    /// final newline submits the turn.
    pub fn compose_input(&self, prompt: &str) -> String {
        let text = format!(
            "You are {persona}, a friendly AI assistant. Respond naturally in complete sentences.\n\
             Context: Previous responses should inform your current response.\n\
             User: {prompt}\n\
             Assistant:",
            persona = self.persona,
        );
        text.lines().map(str::trim_end).collect::<Vec<_>>().join("\\\n")
    }

    fn spawn_session(&self) -> Result<(Session, oneshot::Receiver<()>), RunnerError> {
        let command = self.config.resolved_command();
        let mut cmd = Command::new(&command);
        cmd.args(self.launch_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let capture = |what: &str| RunnerError::ModelProcess(format!("failed to capture child {what}"));
        let stdin = child.stdin.take().ok_or_else(|| capture("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| capture("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| capture("stderr"))?;

        tracing::info!(command = %command, pid = ?pid, "spawned model process");
        TraceEvent::ModelSpawned { command, pid }.emit();

        let (out_tx, out_rx) = mpsc::channel(OUTPUT_CHANNEL);
        tokio::spawn(read_stdout(stdout, out_tx));

        let (ready_tx, ready_rx) = oneshot::channel();
        let tail = Arc::new(parking_lot::Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        tokio::spawn(read_stderr(
            stderr,
            self.config.ready_markers.clone(),
            ready_tx,
            tail.clone(),
        ));

        let (event_tx, event_rx) = watch::channel(ProcessEvent::Running);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(wait_child(child, kill_rx, event_tx));

        let session = Session {
            pid,
            stdin: Some(stdin),
            output: out_rx,
            events: event_rx,
            kill: Some(kill_tx),
            stderr_tail: tail,
        };
        Ok((session, ready_rx))
    }

    /// Spawn a fresh process into `slot` and wait for readiness.
    async fn start_locked(&self, slot: &mut Option<Session>) -> Result<(), RunnerError> {
        if self.is_closed() {
            return Err(RunnerError::Closed);
        }
        if let Some(old) = slot.take() {
            self.set_state(RunnerState::Terminating);
            old.shutdown(SHUTDOWN_GRACE).await;
        }

        self.set_state(RunnerState::Loading);
        let started = Instant::now();
        let (session, ready) = match self.spawn_session() {
            Ok(spawned) => spawned,
            Err(e) => {
                self.set_state(RunnerState::Unstarted);
                return Err(e);
            }
        };

        let waited_ms = self.config.load_timeout_ms;
        let mut events = session.events.clone();
        let outcome = tokio::time::timeout(Duration::from_millis(waited_ms), async {
            tokio::select! {
                signal = ready => if signal.is_ok() { LoadOutcome::Ready } else { LoadOutcome::Exited },
                _ = exited(&mut events) => LoadOutcome::Exited,
                _ = self.closing.cancelled() => LoadOutcome::Closed,
            }
        })
        .await;

        match outcome {
            Ok(LoadOutcome::Ready) => {
                let load_ms = started.elapsed().as_millis() as u64;
                tracing::info!(load_ms, pid = ?session.pid, "model ready");
                TraceEvent::ModelReady { load_ms }.emit();
                *slot = Some(session);
                self.set_state(RunnerState::Ready);
                Ok(())
            }
            Ok(LoadOutcome::Exited) => {
                let tail = session.stderr_tail();
                let status = session.kill_now().await;
                self.set_state(RunnerState::Unstarted);
                Err(RunnerError::ModelProcess(format!(
                    "process {} before signalling readiness: {tail}",
                    describe_exit(status)
                )))
            }
            Ok(LoadOutcome::Closed) => {
                tracing::info!("runner closed while the model was loading");
                self.set_state(RunnerState::Terminating);
                session.kill_now().await;
                Err(RunnerError::Closed)
            }
            Err(_) => {
                tracing::warn!(waited_ms, "model load deadline elapsed, killing process");
                session.kill_now().await;
                self.set_state(RunnerState::Unstarted);
                Err(RunnerError::ModelLoadTimeout { waited_ms })
            }
        }
    }

    async fn run_turn(&self, session: &mut Session, request: &InferenceRequest) -> TurnOutcome {
        let stale = session.drain_stale();
        if stale > 0 {
            tracing::debug!(bytes = stale, "discarded stale model output");
        }

        self.set_state(RunnerState::Generating);
        let input = self.compose_input(&request.prompt);
        if let Err(e) = session.write_line(&input).await {
            return match session.exit_status() {
                Some(code) => TurnOutcome::Exited(code),
                None => TurnOutcome::WriteFailed(e),
            };
        }

        let mut parser = CompletionParser::new(self.config.completion.clone(), self.ansi.clone())
            .with_tokenizer(self.tokenizer.clone())
            .with_max_reply_tokens(request.params.max_tokens as usize);
        let deadline = tokio::time::sleep(Duration::from_millis(self.config.response_timeout_ms));
        tokio::pin!(deadline);
        let mut events = session.events.clone();

        loop {
            tokio::select! {
                biased;

                _ = self.closing.cancelled() => return TurnOutcome::Closed,
                chunk = session.output.recv() => match chunk {
                    Some(bytes) => {
                        if let Some(done) = parser.push(&bytes) {
                            return TurnOutcome::Done(done);
                        }
                    }
                    None => {
                        return match wait_exit(&mut events, KILL_WAIT).await {
                            Some(code) => TurnOutcome::Exited(code),
                            None => TurnOutcome::OutputClosed,
                        };
                    }
                },
                code = exited(&mut events) => return TurnOutcome::Exited(code),
                _ = &mut deadline => {
                    tracing::warn!(
                        accumulated = parser.accumulated().len(),
                        state = ?parser.state(),
                        "response deadline elapsed, returning fallback reply"
                    );
                    return TurnOutcome::TimedOut;
                }
            }
        }
    }
}

#[async_trait]
impl ModelBackend for LlamaRunner {
    fn backend_id(&self) -> &str {
        "llama-cli"
    }

    fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    async fn start(&self) -> Result<(), RunnerError> {
        let mut slot = self.session.lock().await;
        self.start_locked(&mut slot).await
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<Generation, RunnerError> {
        let mut slot = self.session.lock().await;
        if self.is_closed() {
            return Err(RunnerError::Closed);
        }
        if slot.is_none() {
            self.start_locked(&mut slot).await?;
        }

        let started = Instant::now();
        let outcome = match slot.as_mut() {
            Some(session) => self.run_turn(session, request).await,
            None => return Err(RunnerError::ModelProcess("no running model process".into())),
        };
        let duration = started.elapsed();

        let (text, completion) = match outcome {
            TurnOutcome::Done(finished) => (finished.text, finished.completion),
            TurnOutcome::TimedOut => {
                // The abandoned reply is still being produced; a fresh process
                // is the only way to keep it out of the next turn.
                if let Some(session) = slot.take() {
                    self.set_state(RunnerState::Terminating);
                    let code = session.kill_now().await.flatten();
                    TraceEvent::ModelExited {
                        code,
                        during_generation: true,
                    }
                    .emit();
                }
                self.set_state(RunnerState::Unstarted);
                (self.config.fallback_reply.clone(), Completion::TimedOut)
            }
            TurnOutcome::Exited(code) => {
                let tail = slot.as_ref().map(Session::stderr_tail).unwrap_or_default();
                *slot = None;
                self.set_state(RunnerState::Failed);
                TraceEvent::ModelExited {
                    code,
                    during_generation: true,
                }
                .emit();
                tracing::error!(code = ?code, stderr = %tail, "model process exited during generation");
                return Err(RunnerError::ModelProcess(format!(
                    "process {} during generation",
                    describe_exit(Some(code))
                )));
            }
            TurnOutcome::OutputClosed => {
                let tail = slot.as_ref().map(Session::stderr_tail).unwrap_or_default();
                if let Some(session) = slot.take() {
                    session.kill_now().await;
                }
                self.set_state(RunnerState::Failed);
                tracing::error!(stderr = %tail, "model stdout closed but the process kept running, killed it");
                return Err(RunnerError::ModelProcess(format!(
                    "stdout closed during generation while the process {}",
                    describe_exit(None)
                )));
            }
            TurnOutcome::Closed => {
                if let Some(session) = slot.take() {
                    self.set_state(RunnerState::Terminating);
                    let code = session.kill_now().await.flatten();
                    TraceEvent::ModelExited {
                        code,
                        during_generation: true,
                    }
                    .emit();
                }
                tracing::info!("runner closed during generation");
                return Err(RunnerError::Closed);
            }
            TurnOutcome::WriteFailed(e) => {
                *slot = None;
                self.set_state(RunnerState::Failed);
                tracing::error!(error = %e, "failed to write prompt to model process");
                return Err(RunnerError::ModelProcess(format!("writing prompt: {e}")));
            }
        };

        if completion != Completion::TimedOut {
            self.set_state(RunnerState::Ready);
        }
        TraceEvent::GenerationCompleted {
            completion: completion.as_str().to_owned(),
            prompt_chars: request.prompt.chars().count(),
            reply_chars: text.chars().count(),
            duration_ms: duration.as_millis() as u64,
        }
        .emit();
        Ok(Generation {
            text,
            completion,
            duration,
        })
    }

    async fn restart(&self) -> Result<(), RunnerError> {
        let mut slot = self.session.lock().await;
        if self.is_closed() {
            return Err(RunnerError::Closed);
        }
        if let Some(session) = slot.take() {
            self.set_state(RunnerState::Terminating);
            let code = session.shutdown(SHUTDOWN_GRACE).await;
            TraceEvent::ModelExited {
                code,
                during_generation: false,
            }
            .emit();
        }
        self.set_state(RunnerState::Unstarted);
        tracing::info!("model runner reset, next generation spawns a new process");
        Ok(())
    }

    async fn close(&self) {
        self.closing.cancel();
        let mut slot = self.session.lock().await;
        if self.state() == RunnerState::Stopped {
            return;
        }
        self.set_state(RunnerState::Terminating);
        if let Some(session) = slot.take() {
            let code = session.kill_now().await.flatten();
            TraceEvent::ModelExited {
                code,
                during_generation: false,
            }
            .emit();
        }
        self.set_state(RunnerState::Stopped);
    }
}
