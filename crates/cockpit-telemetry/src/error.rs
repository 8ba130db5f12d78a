//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    /// Prometheus text exposition failed.
    #[error("Metrics encoding failed: {0}")]
    Encoding(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
