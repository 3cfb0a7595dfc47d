//! The orchestrator: one conversational turn from inbound text to
//! dispatched reply.
//!
//! A turn records the inbound message, renders the buffer into a prompt,
//! asks the model backend for a reply, records the reply, then hands it to
//! the voice collaborator and every dispatch target. Turns are serialized by
//! a turn lock held for the whole sequence, so buffer order always matches
//! model round-trip order.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use rk_dispatch::{DispatchTarget, DispatcherSet, VoiceSynth};
use rk_domain::trace::TraceEvent;
use rk_domain::{InboundMeta, Role, Turn};
use rk_memory::{Memory, PromptTemplate};
use rk_runner::{GenerationParams, InferenceRequest, ModelBackend, RunnerState};

/// Reply used when the backend fails outright.
pub const APOLOGY: &str = "Sorry, I couldn't generate a response.";

pub struct Brain {
    turn_lock: tokio::sync::Mutex<()>,
    memory: Mutex<Memory>,
    template: PromptTemplate,
    backend: Arc<dyn ModelBackend>,
    params: GenerationParams,
    voice: Option<Arc<dyn VoiceSynth>>,
    dispatchers: RwLock<DispatcherSet>,
}

impl Brain {
    pub fn new(memory: Memory, template: PromptTemplate, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            turn_lock: tokio::sync::Mutex::new(()),
            memory: Mutex::new(memory),
            template,
            backend,
            params: GenerationParams::default(),
            voice: None,
            dispatchers: RwLock::new(DispatcherSet::new()),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_voice(mut self, voice: Arc<dyn VoiceSynth>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_dispatchers(mut self, dispatchers: DispatcherSet) -> Self {
        self.dispatchers = RwLock::new(dispatchers);
        self
    }

    /// Run one turn. Always yields a reply; backend, voice and dispatch
    /// failures are logged and masked.
    pub async fn handle_input(&self, input: &str, meta: &InboundMeta) -> String {
        let _turn = self.turn_lock.lock().await;
        let started = Instant::now();

        let role = meta.role.unwrap_or(Role::User);
        let prompt = {
            let mut memory = self.memory.lock();
            memory.record(Turn::new(role, input));
            self.template.render(memory.buffer())
        };

        let request = InferenceRequest::new(prompt).with_params(self.params);
        let (reply, degraded) = match self.backend.generate(&request).await {
            Ok(generation) => {
                let degraded = generation.timed_out();
                (generation.text, degraded)
            }
            Err(e) => {
                tracing::error!(backend = self.backend.backend_id(), error = %e, "generation failed");
                (APOLOGY.to_owned(), true)
            }
        };

        let buffered_turns = {
            let mut memory = self.memory.lock();
            memory.record(Turn::assistant(&reply));
            memory.buffer().len()
        };

        if let Some(voice) = &self.voice {
            if let Err(e) = voice.speak(&reply, meta).await {
                tracing::warn!(engine = voice.engine(), error = %e, "voice synthesis failed");
            }
        }

        let dispatchers = self.dispatchers.read().clone();
        dispatchers.send_all(&reply, meta).await;

        TraceEvent::TurnHandled {
            platform: meta.platform.clone(),
            buffered_turns,
            degraded,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        reply
    }

    pub fn register_dispatcher(&self, target: Arc<dyn DispatchTarget>) {
        self.dispatchers.write().register(target);
    }

    pub fn dispatcher_names(&self) -> Vec<String> {
        self.dispatchers.read().names()
    }

    /// Empty the conversation buffer; the long-term log is kept.
    pub fn clear_memory(&self) {
        self.memory.lock().clear();
        tracing::info!("conversation buffer cleared");
    }

    /// Empty the long-term log on disk and in memory.
    pub fn clear_long_term(&self) -> rk_domain::Result<()> {
        self.memory.lock().clear_long_term()
    }

    pub fn buffered_turns(&self) -> Vec<Turn> {
        self.memory.lock().buffer().snapshot()
    }

    pub fn remember(&self, turn: Turn) {
        self.memory.lock().remember(turn);
    }

    pub fn search_long_term(&self, needle: &str) -> Vec<Turn> {
        self.memory.lock().search_long_term(needle)
    }

    pub fn model_state(&self) -> RunnerState {
        self.backend.state()
    }

    /// Start the backend ahead of the first turn.
    pub async fn warm_up(&self) -> rk_domain::Result<()> {
        Ok(self.backend.start().await?)
    }

    /// Drop the running model process; the next turn spawns a new one.
    pub async fn restart_model(&self) -> rk_domain::Result<()> {
        Ok(self.backend.restart().await?)
    }

    pub async fn shutdown(&self) {
        self.backend.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rk_dispatch::FnTarget;
    use rk_domain::error::Error;
    use rk_memory::{ConversationBuffer, LongTermLog};
    use rk_runner::{Completion, Generation, RunnerError};

    use super::*;

    /// Replies from a script; records every prompt it was given.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, RunnerError>>>,
        prompts: Mutex<Vec<String>>,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
        delay: Option<Duration>,
        fail_start: bool,
    }

    impl ScriptedBackend {
        fn replying(replies: Vec<Result<String, RunnerError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn backend_id(&self) -> &str {
            "scripted"
        }

        fn state(&self) -> RunnerState {
            RunnerState::Ready
        }

        async fn start(&self) -> Result<(), RunnerError> {
            if self.fail_start {
                return Err(RunnerError::ModelLoadTimeout { waited_ms: 10 });
            }
            Ok(())
        }

        async fn generate(&self, request: &InferenceRequest) -> Result<Generation, RunnerError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.prompts.lock().push(request.prompt.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("Okay.".into()));
            self.in_flight.store(false, Ordering::SeqCst);
            next.map(|text| Generation {
                text,
                completion: Completion::EndMarker,
                duration: Duration::from_millis(1),
            })
        }

        async fn restart(&self) -> Result<(), RunnerError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn brain(backend: Arc<ScriptedBackend>) -> Brain {
        let memory = Memory::new(ConversationBuffer::new(20), None);
        Brain::new(memory, PromptTemplate::default(), backend)
    }

    #[tokio::test]
    async fn turn_records_both_sides_and_renders_history() {
        let backend = Arc::new(ScriptedBackend::replying(vec![Ok("Hi, I'm Reka.".into())]));
        let brain = brain(backend.clone());

        let reply = brain.handle_input("hello", &InboundMeta::for_platform("cli")).await;
        assert_eq!(reply, "Hi, I'm Reka.");

        let turns = brain.buffered_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[0].content(), "hello");
        assert_eq!(turns[1].role(), Role::Assistant);

        let prompts = backend.prompts.lock();
        assert!(prompts[0].contains("User: hello"));
        assert!(prompts[0].trim_end().ends_with("[/INST]"));
    }

    #[tokio::test]
    async fn backend_errors_become_the_apology() {
        let backend = Arc::new(ScriptedBackend::replying(vec![
            Err(RunnerError::ModelProcess("exited with exit code 1".into())),
            Err(RunnerError::ModelLoadTimeout { waited_ms: 10 }),
        ]));
        let brain = brain(backend);

        let meta = InboundMeta::default();
        assert_eq!(brain.handle_input("one", &meta).await, APOLOGY);
        assert_eq!(brain.handle_input("two", &meta).await, APOLOGY);
        assert_eq!(brain.buffered_turns().last().map(|t| t.content().to_owned()), Some(APOLOGY.into()));
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_affect_reply() {
        let backend = Arc::new(ScriptedBackend::replying(vec![Ok("Sure thing.".into())]));
        let brain = brain(backend);
        let delivered = Arc::new(AtomicUsize::new(0));

        let count = delivered.clone();
        brain.register_dispatcher(Arc::new(FnTarget::new("ok", move |text, _| {
            let count = count.clone();
            async move {
                assert_eq!(text, "Sure thing.");
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Error>(())
            }
        })));
        brain.register_dispatcher(Arc::new(FnTarget::new("broken", |_, _| async {
            Err::<(), _>(Error::Other("offline".into()))
        })));

        let reply = brain.handle_input("can you help?", &InboundMeta::default()).await;
        assert_eq!(reply, "Sure thing.");
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(brain.dispatcher_names(), vec!["ok", "broken"]);
    }

    #[tokio::test]
    async fn warm_up_failure_surfaces_as_a_domain_error() {
        let brain = brain(Arc::new(ScriptedBackend {
            fail_start: true,
            ..ScriptedBackend::default()
        }));
        let err = brain.warm_up().await.unwrap_err();
        assert!(matches!(err, Error::ModelLoadTimeout { waited_ms: 10 }), "{err}");
        brain.restart_model().await.unwrap();
    }

    #[tokio::test]
    async fn meta_role_overrides_inbound_role() {
        let brain = brain(Arc::new(ScriptedBackend::default()));
        let meta = InboundMeta {
            role: Some(Role::System),
            ..InboundMeta::default()
        };
        brain.handle_input("stream is starting", &meta).await;
        assert_eq!(brain.buffered_turns()[0].role(), Role::System);
    }

    #[tokio::test]
    async fn clear_memory_keeps_long_term_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = LongTermLog::open(&dir.path().join("lt.jsonl"));
        let memory = Memory::new(ConversationBuffer::new(20), Some(log));
        let brain = Brain::new(memory, PromptTemplate::default(), Arc::new(ScriptedBackend::default()));

        brain.remember(Turn::user("my favourite colour is teal"));
        brain.handle_input("hi", &InboundMeta::default()).await;
        brain.clear_memory();

        assert!(brain.buffered_turns().is_empty());
        assert_eq!(brain.search_long_term("teal").len(), 1);

        brain.clear_long_term().unwrap();
        assert!(brain.search_long_term("teal").is_empty());
    }

    #[tokio::test]
    async fn concurrent_turns_are_serialized() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_millis(20)),
            ..ScriptedBackend::default()
        });
        let brain = Arc::new(brain(backend.clone()));

        let a = {
            let brain = brain.clone();
            tokio::spawn(async move { brain.handle_input("first", &InboundMeta::default()).await })
        };
        let b = {
            let brain = brain.clone();
            tokio::spawn(async move { brain.handle_input("second", &InboundMeta::default()).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert!(!backend.overlapped.load(Ordering::SeqCst));
        let turns = brain.buffered_turns();
        assert_eq!(turns.len(), 4);
        // Each user turn is immediately followed by its own reply.
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[1].role(), Role::Assistant);
        assert_eq!(turns[2].role(), Role::User);
        assert_eq!(turns[3].role(), Role::Assistant);
    }
}
