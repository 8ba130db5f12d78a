//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use cockpit_control::ControlSnapshot;
use cockpit_core::EngineCommand;
use cockpit_feed::{FeedStats, ViewSnapshot, ViewUpdate};
use cockpit_ws::ConnectionState;
use serde::{Deserialize, Serialize};

/// Full cockpit state (sent on WebSocket connect and via REST).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CockpitSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    pub connection: ConnectionState,
    /// Most recent connection diagnostic, if any.
    pub last_diagnostic: Option<String>,
    pub view: ViewSnapshot,
    pub feed: FeedStats,
    pub control: ControlSnapshot,
}

impl Default for CockpitSnapshot {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            connection: ConnectionState::Disconnected,
            last_diagnostic: None,
            view: ViewSnapshot::default(),
            feed: FeedStats::default(),
            control: ControlSnapshot::default(),
        }
    }
}

/// WebSocket message types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Full snapshot (sent on connect and after a client lags).
    Snapshot(CockpitSnapshot),
    /// View updates produced by one frame, in order.
    View {
        timestamp_ms: i64,
        updates: Vec<ViewUpdate>,
    },
    Connection {
        timestamp_ms: i64,
        state: ConnectionState,
    },
    Diagnostic {
        timestamp_ms: i64,
        message: String,
    },
    Control(ControlSnapshot),
}

/// Body of `POST /api/control/command`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandBody {
    pub command: EngineCommand,
}

/// Body of `POST /api/control/instrument`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentBody {
    #[serde(alias = "asset")]
    pub instrument: String,
}

/// Body of `POST /api/control/speed`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeedBody {
    pub speed: f64,
}
