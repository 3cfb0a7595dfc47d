use rk_domain::Error;

/// Errors surfaced by a model backend.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("model did not signal readiness within {waited_ms}ms")]
    ModelLoadTimeout { waited_ms: u64 },

    #[error("model process: {0}")]
    ModelProcess(String),

    #[error("failed to spawn model process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("model runner is closed")]
    Closed,
}

impl From<RunnerError> for Error {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::ModelLoadTimeout { waited_ms } => Error::ModelLoadTimeout { waited_ms },
            RunnerError::ModelProcess(msg) => Error::ModelProcess(msg),
            RunnerError::Spawn(io) => Error::Io(io),
            RunnerError::Closed => Error::ModelProcess("runner is closed".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_domain_errors() {
        let err: Error = RunnerError::ModelLoadTimeout { waited_ms: 250 }.into();
        assert!(matches!(err, Error::ModelLoadTimeout { waited_ms: 250 }));

        let err: Error = RunnerError::ModelProcess("exited with exit code 1".into()).into();
        assert_eq!(err.to_string(), "model process: exited with exit code 1");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "llama-cli");
        let err: Error = RunnerError::Spawn(io).into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = RunnerError::Closed.into();
        assert_eq!(err.to_string(), "model process: runner is closed");
    }
}
