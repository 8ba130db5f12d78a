//! Main application orchestration.
//!
//! Owns the whole cockpit session:
//! - WebSocket connection to the market event stream
//! - View-state reconciliation of every frame
//! - Control-plane synchronizer task (status polls, operator commands)
//! - Dashboard server (render surface)
//!
//! Everything the session acquires is released in a fixed order on every
//! exit path: stop the control timer, close the connection, await both.

use crate::config::AppConfig;
use crate::error::AppResult;
use cockpit_control::{
    CommandState, ControlPlaneClient, ControlPlaneSynchronizer, ControlRequest, ControlSnapshot,
};
use cockpit_dashboard::{DashboardResult, DashboardState};
use cockpit_feed::{Reconciler, ViewUpdate};
use cockpit_telemetry::Metrics;
use cockpit_ws::{ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Operator requests buffered between the dashboard and the event loop.
const OPERATOR_CHANNEL_CAPACITY: usize = 32;

/// Control snapshots buffered between the synchronizer and the event loop.
const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// Main application.
pub struct Application {
    config: AppConfig,
    cockpit: Cockpit,
    operator_rx: mpsc::Receiver<ControlRequest>,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application. Nothing is connected until [`run`](Self::run).
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let (operator_tx, operator_rx) = mpsc::channel(OPERATOR_CHANNEL_CAPACITY);
        let dashboard = DashboardState::new(
            operator_tx,
            config.dashboard.broadcast_capacity,
            config.feed.max_log_entries,
        );

        Ok(Self {
            cockpit: Cockpit {
                reconciler: Reconciler::new(config.feed.max_log_entries),
                dashboard,
                instrument: config.instrument.clone(),
                series_instrument: None,
                ever_connected: false,
                last_control: ControlSnapshot::default(),
            },
            config,
            operator_rx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Render-surface state. Also the entry point for operator requests.
    pub fn dashboard(&self) -> DashboardState {
        self.cockpit.dashboard.clone()
    }

    /// Cancelling this token ends [`run`](Self::run) like ctrl-c does.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until ctrl-c or the shutdown token is cancelled.
    pub async fn run(self) -> AppResult<()> {
        let Self {
            config,
            mut cockpit,
            mut operator_rx,
            shutdown,
        } = self;

        info!(
            ws_url = %config.ws_url,
            control_url = %config.control.base_url,
            instrument = %config.instrument,
            "Starting cockpit"
        );

        let mut session = Session::default();

        let (event_tx, mut event_rx) = mpsc::channel(config.websocket.channel_capacity.max(1));
        session.connection = Some(ConnectionManager::open(
            config.websocket.connection_config(&config.ws_url),
            event_tx,
        ));

        let client = ControlPlaneClient::new(&config.control.base_url, config.control.request_timeout())?;
        let synchronizer = ControlPlaneSynchronizer::new(client, config.control.synchronizer_config())
            .with_instrument(config.instrument.clone());
        let (control_requests_tx, control_requests_rx) = mpsc::channel(OPERATOR_CHANNEL_CAPACITY);
        let (control_tx, mut control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        session.control_task = Some(tokio::spawn(synchronizer.run(
            control_requests_rx,
            control_tx,
            session.control_shutdown.clone(),
        )));

        if config.dashboard.enabled {
            let listener = cockpit_dashboard::bind(&config.dashboard).await?;
            session.dashboard_task = Some(tokio::spawn(cockpit_dashboard::serve(
                listener,
                cockpit.dashboard.clone(),
                config.dashboard.clone(),
                session.dashboard_shutdown.clone(),
            )));
        }

        info!("Entering main event loop");
        let mut events_open = true;
        let mut control_open = true;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }

                event = event_rx.recv(), if events_open => match event {
                    Some(event) => cockpit.handle_connection_event(event),
                    None => {
                        debug!("Connection event channel closed");
                        events_open = false;
                    }
                },

                snapshot = control_rx.recv(), if control_open => match snapshot {
                    Some(snapshot) => cockpit.handle_control_snapshot(snapshot),
                    None => {
                        warn!("Control-plane synchronizer stopped");
                        control_open = false;
                    }
                },

                Some(request) = operator_rx.recv() => {
                    cockpit.handle_operator_request(request, &control_requests_tx);
                }
            }
        }

        // Nothing reads these past the loop; a sender blocked on a full
        // channel must see it closed.
        drop(event_rx);
        drop(control_rx);
        session.teardown().await;
        info!(stats = ?cockpit.reconciler.stats(), "Cockpit stopped");
        Ok(())
    }
}

/// Event-loop state: the reconciler and what the render surface sees.
struct Cockpit {
    reconciler: Reconciler,
    dashboard: DashboardState,
    instrument: String,
    /// Instrument the current candle series was loaded for.
    series_instrument: Option<String>,
    ever_connected: bool,
    last_control: ControlSnapshot,
}

impl Cockpit {
    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::State(state) => self.handle_state(state),
            ConnectionEvent::Frame(raw) => self.handle_frame(&raw),
            ConnectionEvent::Diagnostic(message) => {
                Metrics::ws_diagnostic();
                self.dashboard.publish_diagnostic(message);
            }
        }
    }

    fn handle_state(&mut self, state: ConnectionState) {
        Metrics::ws_state_set(state.as_str());

        match state {
            ConnectionState::Reconnecting => Metrics::ws_reconnect(),
            ConnectionState::Connected => {
                let stale = self
                    .series_instrument
                    .as_deref()
                    .is_some_and(|loaded| loaded != self.instrument);
                if self.ever_connected && stale {
                    info!(instrument = %self.instrument, "Instrument changed while disconnected, clearing chart");
                    self.reset_views();
                }
                self.ever_connected = true;
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }

        self.dashboard.publish_connection(state);
    }

    fn handle_frame(&mut self, raw: &str) {
        Metrics::frame_received();
        let started = Instant::now();
        let dropped_before = self.reconciler.stats().overlay_elements_dropped;

        let updates = match self.reconciler.handle_frame(raw) {
            Ok(updates) => updates,
            Err(e) => {
                Metrics::frame_discarded(e.reason());
                Vec::new()
            }
        };

        let stats = self.reconciler.stats();
        let dropped = stats.overlay_elements_dropped - dropped_before;
        if dropped > 0 {
            Metrics::overlay_elements_dropped(dropped);
        }

        for update in &updates {
            Metrics::view_update(update.label());
            if matches!(update, ViewUpdate::CandlesReplaced(_)) {
                self.series_instrument = Some(self.instrument.clone());
            }
        }

        self.dashboard.publish_view(updates, stats);
        Metrics::frame_processing(started.elapsed().as_micros() as f64);
    }

    fn handle_control_snapshot(&mut self, snapshot: ControlSnapshot) {
        Metrics::engine_status_set(snapshot.status.as_str());
        Metrics::control_reachable(snapshot.reachable);

        if snapshot.command != self.last_control.command {
            match &snapshot.command {
                CommandState::Confirmed { .. }
                | CommandState::TimedOut { .. }
                | CommandState::Failed { .. } => Metrics::command_outcome(snapshot.command.label()),
                CommandState::Idle | CommandState::InFlight { .. } => {}
            }
        }

        self.last_control = snapshot.clone();
        self.dashboard.publish_control(snapshot);
    }

    /// Forward to the synchronizer without blocking the event loop.
    fn handle_operator_request(
        &mut self,
        request: ControlRequest,
        control_requests: &mpsc::Sender<ControlRequest>,
    ) {
        if let ControlRequest::SelectInstrument(instrument) = &request {
            info!(from = %self.instrument, to = %instrument, "Instrument selected");
            self.instrument = instrument.clone();
            self.reset_views();
        }

        match control_requests.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                warn!(?request, "Control request queue full, request dropped");
            }
            Err(TrySendError::Closed(request)) => {
                warn!(?request, "Control-plane synchronizer gone, request dropped");
            }
        }
    }

    fn reset_views(&mut self) {
        let update = self.reconciler.reset();
        self.series_instrument = None;
        Metrics::view_update(update.label());
        self.dashboard.publish_view(vec![update], self.reconciler.stats());
    }
}

/// Tasks and handles acquired by [`Application::run`].
///
/// Dropping a session that was never torn down still stops the control
/// timer and closes the connection.
#[derive(Default)]
struct Session {
    control_shutdown: CancellationToken,
    control_task: Option<JoinHandle<()>>,
    connection: Option<ConnectionHandle>,
    dashboard_shutdown: CancellationToken,
    dashboard_task: Option<JoinHandle<DashboardResult<()>>>,
}

impl Session {
    async fn teardown(mut self) {
        info!("Shutting down");

        self.control_shutdown.cancel();
        let connection = self.connection.take();
        if let Some(connection) = &connection {
            connection.close();
        }

        if let Some(task) = self.control_task.take() {
            if let Err(e) = task.await {
                warn!(?e, "Control task ended abnormally");
            }
        }
        if let Some(connection) = connection {
            connection.shutdown().await;
        }

        self.dashboard_shutdown.cancel();
        if let Some(task) = self.dashboard_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Dashboard server failed"),
                Err(e) => warn!(?e, "Dashboard task ended abnormally"),
            }
        }

        info!("Shutdown complete");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.control_shutdown.cancel();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.dashboard_shutdown.cancel();
    }
}
