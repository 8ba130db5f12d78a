//! Control-plane synchronizer.
//!
//! Runs as its own task: polls the engine status on a fixed interval and
//! carries out operator requests fire-and-forget. Failures are logged and
//! never retried. Every visible change is published as a [`ControlSnapshot`].

use crate::client::ControlPlane;
use crate::tracker::{CommandState, CommandTracker};
use chrono::{DateTime, Utc};
use cockpit_core::{EngineCommand, EngineStatus};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Operator request forwarded to the control plane.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    Command(EngineCommand),
    SelectInstrument(String),
    SetReplaySpeed(f64),
}

/// What the render surface shows about the control plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSnapshot {
    /// Last polled status. Only a poll response changes it.
    pub status: EngineStatus,
    /// Whether the last poll succeeded.
    pub reachable: bool,
    pub command: CommandState,
    pub in_flight: bool,
    pub instrument: Option<String>,
    pub replay_speed: Option<f64>,
    pub last_poll: Option<DateTime<Utc>>,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            status: EngineStatus::Offline,
            reachable: false,
            command: CommandState::Idle,
            in_flight: false,
            instrument: None,
            replay_speed: None,
            last_poll: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    pub poll_interval: Duration,
    pub ack_timeout: Duration,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ControlPlaneSynchronizer<C: ControlPlane> {
    client: C,
    config: SynchronizerConfig,
    tracker: CommandTracker,
    snapshot: ControlSnapshot,
    published: Option<ControlSnapshot>,
}

impl<C: ControlPlane> ControlPlaneSynchronizer<C> {
    pub fn new(client: C, config: SynchronizerConfig) -> Self {
        Self {
            tracker: CommandTracker::new(config.ack_timeout),
            client,
            config,
            snapshot: ControlSnapshot::default(),
            published: None,
        }
    }

    /// Seed the instrument shown before the first successful selection.
    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.snapshot.instrument = Some(instrument.into());
        self
    }

    pub fn snapshot(&self) -> &ControlSnapshot {
        &self.snapshot
    }

    /// Run until `shutdown` is cancelled or the update receiver goes away.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<ControlRequest>,
        updates: mpsc::Sender<ControlSnapshot>,
        shutdown: CancellationToken,
    ) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Control-plane synchronizer started"
        );

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut requests_open = true;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Control-plane synchronizer stopped");
                    return;
                }

                _ = poll.tick() => {
                    self.poll_once().await;
                }

                request = requests.recv(), if requests_open => match request {
                    Some(request) => {
                        if !self.execute(request, &updates).await {
                            debug!("Control snapshot receiver dropped, stopping");
                            return;
                        }
                    }
                    None => {
                        debug!("Control request channel closed");
                        requests_open = false;
                    }
                },

                () = sleep_until_deadline(self.tracker.deadline()) => {
                    self.tracker.expire(Instant::now());
                }
            }

            if !self.publish(&updates).await {
                debug!("Control snapshot receiver dropped, stopping");
                return;
            }
        }
    }

    /// Poll once and fold the result into the snapshot.
    pub async fn poll_once(&mut self) {
        match self.client.fetch_engine_status().await {
            Ok(report) => {
                if report.status != self.snapshot.status {
                    info!(from = %self.snapshot.status, to = %report.status, "Engine status changed");
                }
                self.snapshot.status = report.status;
                self.snapshot.reachable = true;
                self.snapshot.last_poll = Some(Utc::now());
                self.tracker.observe(&report);
            }
            Err(e) => {
                if self.snapshot.reachable {
                    warn!(error = %e, "Control-plane poll failed");
                } else {
                    debug!(error = %e, "Control-plane poll failed");
                }
                self.snapshot.reachable = false;
            }
        }
        self.tracker.expire(Instant::now());
        self.sync_command_state();
    }

    /// Carry out one operator request. Write failures are logged, never retried.
    ///
    /// Returns false once the snapshot receiver is gone; a command is then not sent.
    pub async fn execute(
        &mut self,
        request: ControlRequest,
        updates: &mpsc::Sender<ControlSnapshot>,
    ) -> bool {
        match request {
            ControlRequest::Command(command) => {
                let id = self.tracker.begin(command, Instant::now());
                self.sync_command_state();
                // Show the in-flight state before the write completes.
                if !self.publish(updates).await {
                    return false;
                }

                if let Err(e) = self.client.send_command(command, id).await {
                    warn!(error = %e, %command, %id, "Engine command failed");
                    self.tracker.fail(id, e.to_string());
                }
            }
            ControlRequest::SelectInstrument(asset) => {
                match self.client.select_instrument(&asset).await {
                    Ok(()) => self.snapshot.instrument = Some(asset),
                    Err(e) => warn!(error = %e, %asset, "Instrument selection failed"),
                }
            }
            ControlRequest::SetReplaySpeed(speed) => {
                match self.client.set_replay_speed(speed).await {
                    Ok(()) => self.snapshot.replay_speed = Some(speed),
                    Err(e) => warn!(error = %e, speed, "Replay speed change failed"),
                }
            }
        }
        self.sync_command_state();
        true
    }

    fn sync_command_state(&mut self) {
        self.snapshot.command = self.tracker.state().clone();
        self.snapshot.in_flight = self.tracker.in_flight();
    }

    /// Send the snapshot if it changed. Returns false once the receiver is gone.
    async fn publish(&mut self, updates: &mpsc::Sender<ControlSnapshot>) -> bool {
        self.sync_command_state();
        if self.published.as_ref() == Some(&self.snapshot) {
            return true;
        }
        self.published = Some(self.snapshot.clone());
        updates.send(self.snapshot.clone()).await.is_ok()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StatusReport;
    use crate::error::{ControlError, ControlResult};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::timeout;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeState {
        status: EngineStatus,
        echo_commands: bool,
        last_command_id: Option<Uuid>,
        polls_fail: bool,
        writes_fail: bool,
        commands: Vec<(EngineCommand, Uuid)>,
        assets: Vec<String>,
        speeds: Vec<f64>,
    }

    #[derive(Clone, Default)]
    struct FakeControlPlane {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeControlPlane {
        fn write_error() -> ControlError {
            ControlError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }
        }
    }

    impl ControlPlane for FakeControlPlane {
        async fn fetch_engine_status(&self) -> ControlResult<StatusReport> {
            let state = self.state.lock();
            if state.polls_fail {
                return Err(ControlError::HttpClient("connection refused".to_string()));
            }
            Ok(StatusReport {
                status: state.status,
                last_command_id: state.last_command_id,
            })
        }

        async fn send_command(&self, command: EngineCommand, command_id: Uuid) -> ControlResult<()> {
            let mut state = self.state.lock();
            state.commands.push((command, command_id));
            if state.writes_fail {
                return Err(Self::write_error());
            }
            if state.echo_commands {
                state.last_command_id = Some(command_id);
            }
            Ok(())
        }

        async fn select_instrument(&self, asset: &str) -> ControlResult<()> {
            let mut state = self.state.lock();
            if state.writes_fail {
                return Err(Self::write_error());
            }
            state.assets.push(asset.to_string());
            Ok(())
        }

        async fn set_replay_speed(&self, speed: f64) -> ControlResult<()> {
            let mut state = self.state.lock();
            if state.writes_fail {
                return Err(Self::write_error());
            }
            state.speeds.push(speed);
            Ok(())
        }
    }

    fn synchronizer(fake: &FakeControlPlane) -> ControlPlaneSynchronizer<FakeControlPlane> {
        ControlPlaneSynchronizer::new(
            fake.clone(),
            SynchronizerConfig {
                poll_interval: Duration::from_millis(20),
                ack_timeout: Duration::from_millis(80),
            },
        )
    }

    #[tokio::test]
    async fn test_poll_updates_status_and_reachability() {
        let fake = FakeControlPlane::default();
        fake.state.lock().status = EngineStatus::Loading;
        let mut sync = synchronizer(&fake);

        sync.poll_once().await;
        assert_eq!(sync.snapshot().status, EngineStatus::Loading);
        assert!(sync.snapshot().reachable);
        assert!(sync.snapshot().last_poll.is_some());

        fake.state.lock().polls_fail = true;
        sync.poll_once().await;
        assert_eq!(sync.snapshot().status, EngineStatus::Loading);
        assert!(!sync.snapshot().reachable);
    }

    #[tokio::test]
    async fn test_command_never_changes_status_optimistically() {
        let fake = FakeControlPlane::default();
        let mut sync = synchronizer(&fake);
        let (tx, _rx) = mpsc::channel(16);

        sync.execute(ControlRequest::Command(EngineCommand::Start), &tx).await;

        assert_eq!(sync.snapshot().status, EngineStatus::Offline);
        assert!(sync.snapshot().in_flight);
        assert_eq!(fake.state.lock().commands.len(), 1);

        fake.state.lock().status = EngineStatus::Online;
        sync.poll_once().await;

        assert_eq!(sync.snapshot().status, EngineStatus::Online);
        assert!(!sync.snapshot().in_flight);
        assert_eq!(sync.snapshot().command.label(), "confirmed");
    }

    #[tokio::test]
    async fn test_echoed_command_id_confirms() {
        let fake = FakeControlPlane::default();
        fake.state.lock().echo_commands = true;
        fake.state.lock().status = EngineStatus::Loading;
        let mut sync = synchronizer(&fake);
        let (tx, _rx) = mpsc::channel(16);

        sync.execute(ControlRequest::Command(EngineCommand::Stop), &tx).await;
        sync.poll_once().await;

        let sent_id = fake.state.lock().commands[0].1;
        assert_eq!(
            sync.snapshot().command,
            CommandState::Confirmed {
                id: sent_id,
                command: EngineCommand::Stop
            }
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_not_retried() {
        let fake = FakeControlPlane::default();
        fake.state.lock().writes_fail = true;
        let mut sync = synchronizer(&fake);
        let (tx, _rx) = mpsc::channel(16);

        sync.execute(ControlRequest::Command(EngineCommand::Start), &tx).await;
        sync.poll_once().await;
        sync.poll_once().await;

        assert_eq!(fake.state.lock().commands.len(), 1);
        assert_eq!(sync.snapshot().command.label(), "failed");
        assert!(!sync.snapshot().in_flight);

        sync.execute(ControlRequest::SelectInstrument("GBPUSD".to_string()), &tx)
            .await;
        assert_eq!(sync.snapshot().instrument, None);
    }

    #[tokio::test]
    async fn test_command_not_sent_once_receiver_is_gone() {
        let fake = FakeControlPlane::default();
        let mut sync = synchronizer(&fake);
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let alive = sync
            .execute(ControlRequest::Command(EngineCommand::Start), &tx)
            .await;

        assert!(!alive);
        assert!(fake.state.lock().commands.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_when_receiver_dropped_during_command() {
        let fake = FakeControlPlane::default();
        let sync = synchronizer(&fake);
        let (request_tx, request_rx) = mpsc::channel(16);
        let (update_tx, update_rx) = mpsc::channel(16);
        drop(update_rx);

        request_tx
            .send(ControlRequest::Command(EngineCommand::Start))
            .await
            .unwrap();
        let task = tokio::spawn(sync.run(request_rx, update_tx, CancellationToken::new()));

        timeout(Duration::from_secs(2), task)
            .await
            .expect("synchronizer should stop without a receiver")
            .unwrap();
        assert!(fake.state.lock().commands.is_empty());
    }

    #[tokio::test]
    async fn test_instrument_and_speed_recorded_on_success() {
        let fake = FakeControlPlane::default();
        let mut sync = synchronizer(&fake).with_instrument("EURUSD");
        let (tx, _rx) = mpsc::channel(16);

        assert_eq!(sync.snapshot().instrument.as_deref(), Some("EURUSD"));

        sync.execute(ControlRequest::SelectInstrument("XAUUSD".to_string()), &tx)
            .await;
        sync.execute(ControlRequest::SetReplaySpeed(4.0), &tx).await;

        assert_eq!(sync.snapshot().instrument.as_deref(), Some("XAUUSD"));
        assert_eq!(sync.snapshot().replay_speed, Some(4.0));
        assert_eq!(fake.state.lock().assets, vec!["XAUUSD".to_string()]);
        assert_eq!(fake.state.lock().speeds, vec![4.0]);
    }

    #[tokio::test]
    async fn test_run_times_out_unacknowledged_command() {
        let fake = FakeControlPlane::default();
        let sync = synchronizer(&fake);
        let (request_tx, request_rx) = mpsc::channel(16);
        let (update_tx, mut update_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(sync.run(request_rx, update_tx, shutdown.clone()));
        request_tx
            .send(ControlRequest::Command(EngineCommand::Start))
            .await
            .unwrap();

        let timed_out = timeout(Duration::from_secs(2), async {
            while let Some(snapshot) = update_rx.recv().await {
                if let CommandState::TimedOut { command, .. } = snapshot.command {
                    assert_eq!(command, EngineCommand::Start);
                    assert_eq!(snapshot.status, EngineStatus::Offline);
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        assert!(timed_out);
        shutdown.cancel();
        task.await.unwrap();
    }
}
