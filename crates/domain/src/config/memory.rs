use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of turns kept in the rolling buffer.
    #[serde(default = "d_20")]
    pub capacity: usize,
    /// Append-only JSONL file backing the long-term log.
    #[serde(default = "d_long_term_path")]
    pub long_term_path: PathBuf,
    /// Also write every turn to the long-term log.
    #[serde(default)]
    pub persist_turns: bool,
    /// Assistant name used in the prompt preamble.
    #[serde(default = "d_persona")]
    pub persona: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            long_term_path: d_long_term_path(),
            persist_turns: false,
            persona: d_persona(),
        }
    }
}

fn d_20() -> usize {
    20
}
fn d_long_term_path() -> PathBuf {
    PathBuf::from("./data/long_term_memory.jsonl")
}
fn d_persona() -> String {
    "Reka".into()
}
