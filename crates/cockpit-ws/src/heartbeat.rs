//! Heartbeat management for the stream connection.
//!
//! The producer does not ping on its own, so liveness is probed with
//! WebSocket Ping frames after a period of silence.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct HeartbeatState {
    last_ping: Option<DateTime<Utc>>,
    last_pong: Option<DateTime<Utc>>,
    last_message: DateTime<Utc>,
    waiting_for_pong: bool,
}

impl HeartbeatState {
    fn fresh() -> Self {
        Self {
            last_ping: None,
            last_pong: None,
            last_message: Utc::now(),
            waiting_for_pong: false,
        }
    }
}

/// Heartbeat manager for one connection manager.
pub struct HeartbeatManager {
    /// Silence after which a ping is sent. 0 disables the heartbeat.
    interval_ms: u64,
    /// How long to wait for the pong.
    timeout_ms: u64,
    state: RwLock<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            state: RwLock::new(HeartbeatState::fresh()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_ms > 0
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&self) {
        *self.state.write() = HeartbeatState::fresh();
    }

    pub fn record_ping(&self) {
        let now = Utc::now();
        let mut state = self.state.write();
        state.last_ping = Some(now);
        state.waiting_for_pong = true;
        debug!(time = %now, "Recorded ping");
    }

    pub fn record_pong(&self) {
        let now = Utc::now();
        let mut state = self.state.write();
        state.last_pong = Some(now);
        state.last_message = now;
        state.waiting_for_pong = false;

        if let Some(ping_time) = state.last_ping {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Record that any frame was received.
    pub fn record_message(&self) {
        self.state.write().last_message = Utc::now();
    }

    pub fn is_timed_out(&self) -> bool {
        let state = self.state.read();
        if !state.waiting_for_pong {
            return false;
        }

        match state.last_ping {
            Some(ping_time) => {
                (Utc::now() - ping_time).num_milliseconds() > self.timeout_ms as i64
            }
            None => false,
        }
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - self.state.read().last_message).num_milliseconds()
    }

    /// A ping is due when nothing arrived for a full interval and no ping is outstanding.
    pub fn should_send_heartbeat(&self) -> bool {
        if !self.is_enabled() || self.state.read().waiting_for_pong {
            return false;
        }
        self.time_since_last_message_ms() >= self.interval_ms as i64
    }

    /// Wait for the next heartbeat check.
    pub async fn wait_for_check(&self) {
        let period = (self.interval_ms / 2).max(1);
        tokio::time::sleep(Duration::from_millis(period)).await;
    }

    pub fn stats(&self) -> HeartbeatStats {
        let state = *self.state.read();
        HeartbeatStats {
            last_ping: state.last_ping,
            last_pong: state.last_pong,
            last_message: state.last_message,
            waiting_for_pong: state.waiting_for_pong,
            time_since_last_message_ms: (Utc::now() - state.last_message).num_milliseconds(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_message: DateTime<Utc>,
    pub waiting_for_pong: bool,
    pub time_since_last_message_ms: i64,
}
