//! Model Runner: owns the local inference process and turns its unframed
//! output stream into complete replies.

pub mod backend;
pub mod error;
pub mod llama;
pub mod parser;
pub mod tokenizer;

pub use backend::{Generation, GenerationParams, InferenceRequest, ModelBackend, RunnerState};
pub use error::RunnerError;
pub use llama::LlamaRunner;
pub use parser::{Completion, CompletionParser, ParserState};
