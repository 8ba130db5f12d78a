//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Control plane error: {0}")]
    Control(#[from] cockpit_control::ControlError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] cockpit_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] cockpit_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
