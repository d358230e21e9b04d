//! Error types for the engine boundary

use thiserror::Error;

/// Errors from invoking or introspecting the build engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be spawned at all.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and exited non-zero.
    #[error("engine exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    /// The engine's output was not valid UTF-8 or JSON in the expected shape.
    #[error("could not decode engine output: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
