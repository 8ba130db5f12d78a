//! Trading cockpit.
//!
//! Main application that orchestrates all components:
//! - WebSocket connection to the market event stream
//! - View-state reconciliation (candles, overlays, markers, operator log)
//! - Control-plane synchronization (engine status, operator commands)
//! - Dashboard server

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
