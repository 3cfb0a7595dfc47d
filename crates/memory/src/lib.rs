//! Conversation memory for reka.
//!
//! - [`ConversationBuffer`]: bounded FIFO window of recent turns, the source
//!   of prompt context.
//! - [`LongTermLog`]: unbounded append-only JSONL log of selected turns.
//! - [`PromptTemplate`]: renders a buffer into the instruction-wrapped prompt.
//! - [`Memory`]: the pair as owned by the orchestrator.

pub mod buffer;
pub mod long_term;
pub mod prompt;

pub use buffer::ConversationBuffer;
pub use long_term::LongTermLog;
pub use prompt::PromptTemplate;

use rk_domain::config::MemoryConfig;
use rk_domain::error::Result;
use rk_domain::Turn;

/// Short-term buffer plus optional long-term log.
pub struct Memory {
    buffer: ConversationBuffer,
    long_term: Option<LongTermLog>,
    persist_turns: bool,
}

impl Memory {
    pub fn new(buffer: ConversationBuffer, long_term: Option<LongTermLog>) -> Self {
        Self {
            buffer,
            long_term,
            persist_turns: false,
        }
    }

    /// Build from config, opening the long-term log file.
    pub fn from_config(config: &MemoryConfig) -> Self {
        let long_term = LongTermLog::open(&config.long_term_path);
        Self {
            buffer: ConversationBuffer::new(config.capacity),
            long_term: Some(long_term),
            persist_turns: config.persist_turns,
        }
    }

    /// Also mirror every recorded turn into the long-term log.
    pub fn with_persist_turns(mut self, persist: bool) -> Self {
        self.persist_turns = persist;
        self
    }

    /// Append a turn to the buffer (and the long-term log when mirroring).
    pub fn record(&mut self, turn: Turn) {
        if self.persist_turns {
            if let Some(log) = &self.long_term {
                log.append(turn.clone());
            }
        }
        self.buffer.append(turn);
    }

    /// Explicitly save a turn to the long-term log only.
    pub fn remember(&self, turn: Turn) {
        match &self.long_term {
            Some(log) => log.append(turn),
            None => tracing::debug!("no long-term log configured, dropping remembered turn"),
        }
    }

    pub fn search_long_term(&self, needle: &str) -> Vec<Turn> {
        self.long_term
            .as_ref()
            .map(|log| log.search(needle))
            .unwrap_or_default()
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    /// Empty the buffer. The long-term log is untouched.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Forget everything in the long-term log. The buffer is untouched.
    pub fn clear_long_term(&self) -> Result<()> {
        match &self.long_term {
            Some(log) => log.clear(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_turns_mirrors_into_long_term() {
        let dir = tempfile::tempdir().unwrap();
        let log = LongTermLog::open(&dir.path().join("lt.jsonl"));
        let mut memory =
            Memory::new(ConversationBuffer::new(2), Some(log)).with_persist_turns(true);

        for text in ["one", "two", "three"] {
            memory.record(Turn::user(text));
        }

        assert_eq!(memory.buffer().len(), 2);
        assert_eq!(memory.search_long_term("o").len(), 2);
        assert_eq!(memory.search_long_term("three").len(), 1);
    }

    #[test]
    fn clear_keeps_long_term() {
        let dir = tempfile::tempdir().unwrap();
        let log = LongTermLog::open(&dir.path().join("lt.jsonl"));
        let mut memory = Memory::new(ConversationBuffer::new(5), Some(log));

        memory.record(Turn::user("hello"));
        memory.remember(Turn::user("favourite colour is teal"));
        memory.clear();

        assert!(memory.buffer().is_empty());
        assert_eq!(memory.search_long_term("teal").len(), 1);
    }

    #[test]
    fn clear_long_term_keeps_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let log = LongTermLog::open(&dir.path().join("lt.jsonl"));
        let mut memory = Memory::new(ConversationBuffer::new(5), Some(log));

        memory.record(Turn::user("hello"));
        memory.remember(Turn::user("favourite colour is teal"));
        memory.clear_long_term().unwrap();

        assert!(memory.search_long_term("teal").is_empty());
        assert_eq!(memory.buffer().len(), 1);
    }

    #[test]
    fn clear_long_term_without_log_is_a_no_op() {
        let memory = Memory::new(ConversationBuffer::new(5), None);
        memory.clear_long_term().unwrap();
    }
}
