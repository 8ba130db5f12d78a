//! Control-plane synchronization for the trading cockpit.
//!
//! The control plane owns the engine run state (`OFFLINE`/`LOADING`/`ONLINE`)
//! and the selected instrument. This crate provides:
//! - `ControlPlaneClient`: HTTP client for status polls and operator writes
//! - `CommandTracker`: correlation-id acknowledgment with timeout-as-failure
//! - `ControlPlaneSynchronizer`: the periodic poll loop publishing `ControlSnapshot`s

pub mod client;
pub mod error;
pub mod synchronizer;
pub mod tracker;

pub use client::{
    CommandRequest, ControlPlane, ControlPlaneClient, ReplaySpeedRequest, SelectAssetRequest,
    StatusReport, DEFAULT_CONTROL_URL, DEFAULT_TIMEOUT,
};
pub use error::{ControlError, ControlResult};
pub use synchronizer::{ControlPlaneSynchronizer, ControlRequest, ControlSnapshot, SynchronizerConfig};
pub use tracker::{CommandState, CommandTracker};
