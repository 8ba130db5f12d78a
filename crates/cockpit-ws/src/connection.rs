//! WebSocket connection manager.
//!
//! Handles the connection lifecycle for the market event stream. Every failure
//! (unparseable URL, blocked insecure scheme, refused handshake, remote close,
//! heartbeat loss) is contained here and surfaces only as a state transition
//! and a diagnostic on the event channel.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Local development endpoint of the event stream.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/logs";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Maximum consecutive reconnection attempts (0 = never reconnect).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Silence after which a ping is sent (0 = no heartbeat).
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout (pong must arrive within this).
    pub heartbeat_timeout_ms: u64,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
    /// Permit plain `ws://` endpoints.
    pub allow_insecure: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30000,
            heartbeat_interval_ms: 30000,
            heartbeat_timeout_ms: 10000,
            connect_timeout_ms: 10000,
            allow_insecure: true,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the connection reports to its owner, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    State(ConnectionState),
    /// Raw text frame, not yet parsed.
    Frame(String),
    /// Human-readable failure report.
    Diagnostic(String),
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    heartbeat: HeartbeatManager,
    event_tx: mpsc::Sender<ConnectionEvent>,
    /// Consecutive failed sessions since the last successful connect.
    reconnect_count: RwLock<u32>,
    /// Transports opened and released over the manager's lifetime.
    transports_opened: AtomicU64,
    transports_released: AtomicU64,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<ConnectionEvent>) -> Self {
        Self {
            heartbeat: HeartbeatManager::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            event_tx,
            reconnect_count: RwLock::new(0),
            transports_opened: AtomicU64::new(0),
            transports_released: AtomicU64::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Open a connection in the background and return its handle.
    ///
    /// Never fails: a connection that cannot be established is reported as
    /// `Connecting -> Disconnected` plus a diagnostic on `event_tx`.
    /// Must be called from within a Tokio runtime.
    pub fn open(config: ConnectionConfig, event_tx: mpsc::Sender<ConnectionEvent>) -> ConnectionHandle {
        let manager = Arc::new(Self::new(config, event_tx));
        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run().await }
        });

        ConnectionHandle {
            manager,
            task: Some(task),
            close_requested: AtomicBool::new(false),
        }
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Number of transports released so far. Equals the number opened once
    /// the manager has stopped.
    pub fn transports_released(&self) -> u64 {
        self.transports_released.load(Ordering::SeqCst)
    }

    pub fn transports_opened(&self) -> u64 {
        self.transports_opened.load(Ordering::SeqCst)
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!("ConnectionManager shutdown requested");
            self.shutdown_token.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Run the connect/reconnect loop until shutdown or until retries are exhausted.
    pub async fn run(&self) {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                self.transition(ConnectionState::Disconnected).await;
                return;
            }

            self.transition(ConnectionState::Connecting).await;

            let permanent = match self.try_connect().await {
                Ok(()) => {
                    info!("WebSocket connection closed");
                    false
                }
                Err(e) => {
                    warn!(error = %e, url = %self.config.url, "WebSocket connection error");
                    self.diagnostic(e.to_string()).await;
                    e.is_permanent()
                }
            };

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.transition(ConnectionState::Disconnected).await;
                return;
            }

            if permanent || self.config.max_reconnect_attempts == 0 {
                self.transition(ConnectionState::Disconnected).await;
                return;
            }

            let attempt = {
                let mut count = self.reconnect_count.write();
                *count += 1;
                *count
            };

            if attempt > self.config.max_reconnect_attempts {
                error!(attempts = attempt - 1, "Max reconnection attempts reached");
                self.diagnostic(format!(
                    "Gave up reconnecting after {} attempts",
                    attempt - 1
                ))
                .await;
                self.transition(ConnectionState::Disconnected).await;
                return;
            }

            self.transition(ConnectionState::Reconnecting).await;

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    self.transition(ConnectionState::Disconnected).await;
                    return;
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        let request = self.build_request()?;
        info!(url = %self.config.url, "Connecting to WebSocket");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let handshake = tokio::time::timeout(
            timeout,
            connect_async_tls_with_config(request, None, true, None),
        );

        let ws_stream = tokio::select! {
            result = handshake => match result {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(WsError::ConnectTimeout(self.config.connect_timeout_ms)),
            },
            () = self.shutdown_token.cancelled() => return Ok(()),
        };

        self.transports_opened.fetch_add(1, Ordering::SeqCst);
        let (mut write, mut read) = ws_stream.split();

        *self.reconnect_count.write() = 0;
        self.heartbeat.reset();
        self.transition(ConnectionState::Connected).await;
        info!("WebSocket connected");

        let result = loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    break Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            self.emit(ConnectionEvent::Frame(text)).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.heartbeat.record_message();
                            match String::from_utf8(data) {
                                Ok(text) => self.emit(ConnectionEvent::Frame(text)).await,
                                Err(_) => {
                                    warn!("Discarding non UTF-8 binary frame");
                                    self.diagnostic("Discarded non UTF-8 binary frame".to_string()).await;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            self.heartbeat.record_message();
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            break Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            break Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            break Ok(());
                        }
                        Some(Ok(_)) => {}
                    }
                }

                () = self.heartbeat.wait_for_check(), if self.heartbeat.is_enabled() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        break Err(WsError::HeartbeatTimeout);
                    }

                    if self.heartbeat.should_send_heartbeat() {
                        if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                            break Err(e.into());
                        }
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        };

        drop(write);
        drop(read);
        self.transports_released.fetch_add(1, Ordering::SeqCst);
        debug!("Transport released");

        result
    }

    /// Validate the configured URL before any I/O happens.
    fn build_request(&self) -> WsResult<Request> {
        let url = self.config.url.trim();
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| WsError::InvalidUrl(url.to_string()))?;

        match scheme.as_str() {
            "wss" => {}
            "ws" if self.config.allow_insecure => {}
            "ws" => return Err(WsError::InsecureBlocked(url.to_string())),
            _ => return Err(WsError::InvalidUrl(url.to_string())),
        }

        url.into_client_request()
            .map_err(|e| WsError::InvalidUrl(format!("{url}: {e}")))
    }

    async fn transition(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
            self.emit(ConnectionEvent::State(next)).await;
        }
    }

    async fn diagnostic(&self, message: String) {
        self.emit(ConnectionEvent::Diagnostic(message)).await;
    }

    /// Deliver an event to the owner. A full channel never blocks shutdown:
    /// once close is requested, events that cannot be queued are dropped.
    async fn emit(&self, event: ConnectionEvent) {
        tokio::select! {
            biased;

            sent = self.event_tx.send(event) => {
                if sent.is_err() {
                    debug!("Event receiver dropped, stopping connection");
                    self.shutdown_token.cancel();
                }
            }

            () = self.shutdown_token.cancelled() => {
                debug!("Shutdown requested while the event channel is full, event dropped");
            }
        }
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        Duration::from_millis(delay + rand_jitter(base.min(1000)))
    }
}

/// Generate random jitter in `0..=bound_ms`.
fn rand_jitter(bound_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (bound_ms + 1)
}

/// Owner's handle on an open connection.
///
/// Closing is idempotent and also happens when the handle is dropped.
pub struct ConnectionHandle {
    manager: Arc<ConnectionManager>,
    task: Option<JoinHandle<()>>,
    close_requested: AtomicBool,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Request close. Returns `true` only for the call that initiated it.
    pub fn close(&self) -> bool {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.manager.shutdown();
        true
    }

    /// Close and wait for the connection task to finish.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(?e, "Connection task ended abnormally");
            }
        }
    }

    /// Wait for the connection task to finish on its own (retries exhausted
    /// or permanent failure) without requesting close.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(?e, "Connection task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(config: ConnectionConfig) -> (ConnectionManager, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (ConnectionManager::new(config, tx), rx)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.allow_insecure);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let (manager, _rx) = manager_with(ConnectionConfig {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 1000,
            ..Default::default()
        });

        let jitter_bound = 100;
        let d1 = manager.calculate_backoff_delay(1).as_millis() as u64;
        let d2 = manager.calculate_backoff_delay(2).as_millis() as u64;
        let d3 = manager.calculate_backoff_delay(3).as_millis() as u64;
        let d10 = manager.calculate_backoff_delay(10).as_millis() as u64;

        assert!((100..=100 + jitter_bound).contains(&d1));
        assert!((200..=200 + jitter_bound).contains(&d2));
        assert!((400..=400 + jitter_bound).contains(&d3));
        assert!((1000..=1000 + jitter_bound).contains(&d10));
    }

    #[test]
    fn test_build_request_rejects_garbage() {
        let (manager, _rx) = manager_with(ConnectionConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(manager.build_request(), Err(WsError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_request_rejects_unknown_scheme() {
        let (manager, _rx) = manager_with(ConnectionConfig {
            url: "http://localhost:8000/ws/logs".to_string(),
            ..Default::default()
        });
        assert!(matches!(manager.build_request(), Err(WsError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_request_blocks_insecure_when_disallowed() {
        let (manager, _rx) = manager_with(ConnectionConfig {
            url: "ws://localhost:8000/ws/logs".to_string(),
            allow_insecure: false,
            ..Default::default()
        });
        let err = manager.build_request().unwrap_err();
        assert!(matches!(err, WsError::InsecureBlocked(_)));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_build_request_accepts_secure() {
        let (manager, _rx) = manager_with(ConnectionConfig {
            url: "wss://cockpit.example.com/ws/logs".to_string(),
            allow_insecure: false,
            ..Default::default()
        });
        assert!(manager.build_request().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_settles_disconnected_with_diagnostic() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = ConnectionManager::open(
            ConnectionConfig {
                url: "::::".to_string(),
                ..Default::default()
            },
            tx,
        );

        handle.finished().await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert_eq!(events.first(), Some(&ConnectionEvent::State(ConnectionState::Connecting)));
        assert!(events
            .iter()
            .any(|e| matches!(e, ConnectionEvent::Diagnostic(msg) if msg.contains("Invalid WebSocket URL"))));
        assert_eq!(events.last(), Some(&ConnectionEvent::State(ConnectionState::Disconnected)));
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (tx, _rx) = mpsc::channel(16);
        let handle = ConnectionManager::open(
            ConnectionConfig {
                url: "ws://127.0.0.1:9".to_string(),
                max_reconnect_attempts: 0,
                ..Default::default()
            },
            tx,
        );

        assert!(handle.close());
        assert!(!handle.close());
        handle.shutdown().await;
    }
}
