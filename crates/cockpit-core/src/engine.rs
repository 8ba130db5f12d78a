//! Control-plane run state.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Authoritative run state of the trading engine, as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    #[default]
    Offline,
    Loading,
    Online,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Loading => "LOADING",
            Self::Online => "ONLINE",
        }
    }
}

impl FromStr for EngineStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFLINE" => Ok(Self::Offline),
            "LOADING" => Ok(Self::Loading),
            "ONLINE" => Ok(Self::Online),
            other => Err(CoreError::UnknownEngineStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator command sent to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineCommand {
    Start,
    Stop,
}

impl EngineCommand {
    /// Status the engine reports once it has carried out this command.
    pub fn target_status(&self) -> EngineStatus {
        match self {
            Self::Start => EngineStatus::Online,
            Self::Stop => EngineStatus::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

impl FromStr for EngineCommand {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "STOP" => Ok(Self::Stop),
            _ => Err(CoreError::UnknownEngineCommand(s.to_string())),
        }
    }
}

impl std::fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
