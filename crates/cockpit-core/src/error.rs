//! Error types for cockpit-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Unknown engine status: {0}")]
    UnknownEngineStatus(String),

    #[error("Unknown engine command: {0}")]
    UnknownEngineCommand(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
