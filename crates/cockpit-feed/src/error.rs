//! Feed error types.
//!
//! Every variant describes a frame that was discarded; none of them is fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("market_data event carries both candles and tick")]
    AmbiguousMarketData,

    #[error("Invalid candles: {0}")]
    InvalidCandles(String),

    #[error("Invalid tick: {0}")]
    InvalidTick(String),

    #[error("Invalid marker: {0}")]
    InvalidMarker(String),
}

impl FeedError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MissingField(_) => "missing_field",
            Self::UnknownKind(_) => "unknown_kind",
            Self::AmbiguousMarketData => "ambiguous_market_data",
            Self::InvalidCandles(_) => "invalid_candles",
            Self::InvalidTick(_) => "invalid_tick",
            Self::InvalidMarker(_) => "invalid_marker",
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
