//! Control-plane error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type ControlResult<T> = Result<T, ControlError>;
