//! Dashboard state management.
//!
//! `DashboardState` mirrors the cockpit state for the render surface. The
//! application publishes into it; every publish updates the stored snapshot
//! and broadcasts one serialized [`DashboardMessage`] under the same lock, so
//! a client that subscribes together with a snapshot never sees a gap or a
//! duplicate.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use cockpit_control::{ControlRequest, ControlSnapshot};
use cockpit_feed::{FeedStats, ViewUpdate};
use cockpit_ws::ConnectionState;

use crate::error::{DashboardError, DashboardResult};
use crate::types::{CockpitSnapshot, DashboardMessage};

#[derive(Clone)]
pub struct DashboardState {
    snapshot: Arc<RwLock<CockpitSnapshot>>,
    broadcast_tx: broadcast::Sender<String>,
    requests_tx: mpsc::Sender<ControlRequest>,
    /// Log retention of the mirrored view (0 = unbounded).
    max_log_entries: usize,
}

impl DashboardState {
    pub fn new(
        requests_tx: mpsc::Sender<ControlRequest>,
        broadcast_capacity: usize,
        max_log_entries: usize,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            snapshot: Arc::new(RwLock::new(CockpitSnapshot::default())),
            broadcast_tx,
            requests_tx,
            max_log_entries,
        }
    }

    /// Collect a full snapshot of the current state.
    pub fn collect_snapshot(&self) -> CockpitSnapshot {
        let mut snapshot = self.snapshot.read().clone();
        snapshot.timestamp_ms = Utc::now().timestamp_millis();
        snapshot
    }

    /// Subscribe to incremental messages, paired with the snapshot they follow.
    pub fn subscribe(&self) -> (CockpitSnapshot, broadcast::Receiver<String>) {
        let guard = self.snapshot.read();
        let rx = self.broadcast_tx.subscribe();
        let mut snapshot = guard.clone();
        snapshot.timestamp_ms = Utc::now().timestamp_millis();
        (snapshot, rx)
    }

    pub fn client_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    /// Apply the updates one frame produced.
    pub fn publish_view(&self, updates: Vec<ViewUpdate>, stats: FeedStats) {
        let mut snapshot = self.snapshot.write();
        snapshot.feed = stats;
        if updates.is_empty() {
            return;
        }
        for update in &updates {
            snapshot.view.apply(update, self.max_log_entries);
        }
        self.broadcast(&DashboardMessage::View {
            timestamp_ms: Utc::now().timestamp_millis(),
            updates,
        });
    }

    pub fn publish_connection(&self, state: ConnectionState) {
        let mut snapshot = self.snapshot.write();
        if snapshot.connection == state {
            return;
        }
        snapshot.connection = state;
        self.broadcast(&DashboardMessage::Connection {
            timestamp_ms: Utc::now().timestamp_millis(),
            state,
        });
    }

    pub fn publish_diagnostic(&self, message: String) {
        let mut snapshot = self.snapshot.write();
        snapshot.last_diagnostic = Some(message.clone());
        self.broadcast(&DashboardMessage::Diagnostic {
            timestamp_ms: Utc::now().timestamp_millis(),
            message,
        });
    }

    pub fn publish_control(&self, control: ControlSnapshot) {
        let mut snapshot = self.snapshot.write();
        snapshot.control = control.clone();
        self.broadcast(&DashboardMessage::Control(control));
    }

    /// Forward an operator request to the application loop.
    pub async fn submit(&self, request: ControlRequest) -> DashboardResult<()> {
        self.requests_tx
            .send(request)
            .await
            .map_err(|_| DashboardError::RequestChannelClosed)
    }

    fn broadcast(&self, message: &DashboardMessage) {
        match serde_json::to_string(message) {
            // No subscribers is not an error.
            Ok(json) => {
                let _ = self.broadcast_tx.send(json);
            }
            Err(e) => debug!(error = %e, "Failed to serialize dashboard message"),
        }
    }
}
