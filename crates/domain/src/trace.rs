use serde::Serialize;

/// Structured trace events emitted across all reka crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ModelSpawned {
        command: String,
        pid: Option<u32>,
    },
    ModelReady {
        load_ms: u64,
    },
    ModelExited {
        code: Option<i32>,
        during_generation: bool,
    },
    GenerationCompleted {
        completion: String,
        prompt_chars: usize,
        reply_chars: usize,
        duration_ms: u64,
    },
    TurnHandled {
        platform: String,
        buffered_turns: usize,
        degraded: bool,
        duration_ms: u64,
    },
    DispatchFailed {
        target: String,
        error: String,
    },
    LongTermAppend {
        entries: usize,
    },
    LongTermCleared {
        removed: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "rk_event");
    }
}
