//! Inbound event tags.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tag of an event on the market stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Warning,
    Error,
    Trade,
    AiAnalysis,
    MarketData,
}

impl EventKind {
    /// Every event except market data ends up in the operator log.
    pub fn is_log(&self) -> bool {
        !matches!(self, Self::MarketData)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Trade => "trade",
            Self::AiAnalysis => "ai_analysis",
            Self::MarketData => "market_data",
        }
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "trade" => Ok(Self::Trade),
            "ai_analysis" => Ok(Self::AiAnalysis),
            "market_data" => Ok(Self::MarketData),
            other => Err(CoreError::UnknownEventKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
