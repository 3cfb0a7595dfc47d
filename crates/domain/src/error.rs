/// Shared error type used across all reka crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("model did not signal readiness within {waited_ms}ms")]
    ModelLoadTimeout { waited_ms: u64 },

    #[error("model process: {0}")]
    ModelProcess(String),

    #[error("dispatch target {target}: {message}")]
    Dispatch { target: String, message: String },

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("voice: {0}")]
    Voice(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
