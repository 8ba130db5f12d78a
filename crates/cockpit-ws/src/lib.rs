//! WebSocket client for the cockpit market event stream.
//!
//! Provides a connection that never fails its caller:
//! - Fail-silent construction (bad or blocked URLs become a `Disconnected` state)
//! - Optional reconnection with capped exponential backoff
//! - Heartbeat monitoring (ping on silence, pong timeout detection)
//! - A single ordered channel carrying state transitions, frames and diagnostics

pub mod connection;
pub mod error;
pub mod heartbeat;

pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState,
    DEFAULT_WS_URL,
};
pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
