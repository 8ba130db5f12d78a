//! cockpit-dashboard - Render surface for the trading cockpit.
//!
//! Serves the derived view state to browser clients and accepts operator
//! commands:
//!
//! - REST snapshot of candles, overlays, markers, log, connection and control state
//! - WebSocket stream: an initial `snapshot`, then `view` / `connection` /
//!   `diagnostic` / `control` messages as they happen
//! - Operator endpoints forwarded to the application loop as `ControlRequest`s
//! - Prometheus text exposition
//!
//! # Routes
//!
//! ```text
//! GET  /api/snapshot            → CockpitSnapshot JSON
//! GET  /ws                      → WebSocket upgrade
//! GET  /metrics                 → Prometheus text format
//! POST /api/control/command     {"command": "START" | "STOP"}
//! POST /api/control/instrument  {"instrument": "EURUSD"}
//! POST /api/control/speed       {"speed": 2.0}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cockpit_dashboard::{run_server, DashboardConfig, DashboardState};
//!
//! let (requests_tx, requests_rx) = tokio::sync::mpsc::channel(32);
//! let state = DashboardState::new(requests_tx, config.broadcast_capacity, 1000);
//! tokio::spawn(run_server(state.clone(), config, shutdown.clone()));
//! ```

mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{bind, create_router, run_server, serve, AppState, ConnectionGuard, ConnectionLimiter};
pub use state::DashboardState;
pub use types::{CockpitSnapshot, CommandBody, DashboardMessage, InstrumentBody, SpeedBody};
