//! Command acknowledgment tracking.
//!
//! Every command gets a correlation id. It stays in flight until a poll
//! confirms it (the service echoes the id, or reports the status the command
//! targets) or until the acknowledgment window closes, which is a failure in
//! its own right. Sending a command never changes the polled engine status.

use cockpit_core::{EngineCommand, EngineStatus};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::StatusReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CommandState {
    Idle,
    InFlight {
        id: Uuid,
        command: EngineCommand,
        #[serde(skip)]
        sent_at: Instant,
    },
    Confirmed {
        id: Uuid,
        command: EngineCommand,
    },
    TimedOut {
        id: Uuid,
        command: EngineCommand,
    },
    Failed {
        id: Uuid,
        command: EngineCommand,
        reason: String,
    },
}

impl CommandState {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::Idle => None,
            Self::InFlight { id, .. }
            | Self::Confirmed { id, .. }
            | Self::TimedOut { id, .. }
            | Self::Failed { id, .. } => Some(*id),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InFlight { .. } => "in_flight",
            Self::Confirmed { .. } => "confirmed",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

pub struct CommandTracker {
    ack_timeout: Duration,
    state: CommandState,
}

impl CommandTracker {
    pub fn new(ack_timeout: Duration) -> Self {
        Self {
            ack_timeout,
            state: CommandState::Idle,
        }
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn in_flight(&self) -> bool {
        matches!(self.state, CommandState::InFlight { .. })
    }

    /// Start tracking a new command. A command still in flight is superseded.
    pub fn begin(&mut self, command: EngineCommand, now: Instant) -> Uuid {
        if let CommandState::InFlight { id, .. } = self.state {
            debug!(superseded = %id, "Command superseded before acknowledgment");
        }

        let id = Uuid::new_v4();
        self.state = CommandState::InFlight {
            id,
            command,
            sent_at: now,
        };
        id
    }

    /// The write for `id` failed. Ignored if `id` is no longer the tracked command.
    pub fn fail(&mut self, id: Uuid, reason: impl Into<String>) -> bool {
        match self.state {
            CommandState::InFlight {
                id: current,
                command,
                ..
            } if current == id => {
                self.state = CommandState::Failed {
                    id,
                    command,
                    reason: reason.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// Apply a poll result. Returns true if the pending command was confirmed.
    pub fn observe(&mut self, report: &StatusReport) -> bool {
        let CommandState::InFlight { id, command, .. } = self.state else {
            return false;
        };

        let echoed = report.last_command_id == Some(id);
        let reached = report.status == command.target_status();
        if echoed || reached {
            debug!(%id, %command, echoed, "Command acknowledged");
            self.state = CommandState::Confirmed { id, command };
            return true;
        }
        false
    }

    /// When the pending command's acknowledgment window closes.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            CommandState::InFlight { sent_at, .. } => Some(sent_at + self.ack_timeout),
            _ => None,
        }
    }

    /// Fail the pending command if its window has closed. Returns true on timeout.
    pub fn expire(&mut self, now: Instant) -> bool {
        let CommandState::InFlight { id, command, .. } = self.state else {
            return false;
        };

        match self.deadline() {
            Some(deadline) if now >= deadline => {
                warn!(%id, %command, timeout_ms = self.ack_timeout.as_millis() as u64, "Command not acknowledged in time");
                self.state = CommandState::TimedOut { id, command };
                true
            }
            _ => false,
        }
    }

    /// Status a fresh command would be judged against; exposed for display.
    pub fn expected_status(&self) -> Option<EngineStatus> {
        match self.state {
            CommandState::InFlight { command, .. } => Some(command.target_status()),
            _ => None,
        }
    }
}
