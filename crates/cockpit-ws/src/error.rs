//! WebSocket error types.
//!
//! These never reach the owner of a connection; the manager turns them into
//! state transitions and diagnostics.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("Insecure connection blocked: {0}")]
    InsecureBlocked(String),

    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

impl WsError {
    /// Errors that no amount of retrying will fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::InsecureBlocked(_))
    }
}

pub type WsResult<T> = Result<T, WsError>;
