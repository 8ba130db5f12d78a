//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use cockpit_control::ControlRequest;
use cockpit_core::is_valid_price;
use cockpit_telemetry::{gather_text, Metrics};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::DashboardState;
use crate::types::{CockpitSnapshot, CommandBody, DashboardMessage, InstrumentBody, SpeedBody};

/// Connection limiter to prevent too many concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// The guard owns a reference to the limiter so it can move into the
    /// upgraded connection task.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    dashboard_state: DashboardState,
    connection_limiter: Arc<ConnectionLimiter>,
    config: DashboardConfig,
}

impl AppState {
    pub fn new(dashboard_state: DashboardState, config: DashboardConfig) -> Self {
        Self {
            dashboard_state,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/control/command", post(post_command))
        .route("/api/control/instrument", post(post_instrument))
        .route("/api/control/speed", post(post_speed))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_snapshot(State(state): State<AppState>) -> Json<CockpitSnapshot> {
    Json(state.dashboard_state.collect_snapshot())
}

async fn get_metrics() -> Response {
    match gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn post_command(State(state): State<AppState>, Json(body): Json<CommandBody>) -> Response {
    submit(&state, ControlRequest::Command(body.command)).await
}

async fn post_instrument(
    State(state): State<AppState>,
    Json(body): Json<InstrumentBody>,
) -> Response {
    let instrument = body.instrument.trim();
    if instrument.is_empty() {
        return (StatusCode::BAD_REQUEST, "instrument must not be empty").into_response();
    }
    submit(&state, ControlRequest::SelectInstrument(instrument.to_string())).await
}

async fn post_speed(State(state): State<AppState>, Json(body): Json<SpeedBody>) -> Response {
    // Same positivity rule as prices.
    if !is_valid_price(body.speed) {
        return (StatusCode::BAD_REQUEST, "speed must be a positive number").into_response();
    }
    submit(&state, ControlRequest::SetReplaySpeed(body.speed)).await
}

async fn submit(state: &AppState, request: ControlRequest) -> Response {
    debug!(?request, "Operator request");
    match state.dashboard_state.submit(request).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!(error = %e, "Operator request dropped");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let guard = match state.connection_limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!(
                current = state.connection_limiter.current_count(),
                max = state.config.max_connections,
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "New WebSocket connection"
    );

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state.dashboard_state, guard))
}

/// Handle a WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, state: DashboardState, guard: ConnectionGuard) {
    Metrics::dashboard_client_connected();
    let (mut sender, mut receiver) = socket.split();

    let (snapshot, mut broadcast_rx) = state.subscribe();
    if !send_snapshot(&mut sender, snapshot).await {
        debug!("Failed to send initial snapshot, client disconnected");
        Metrics::dashboard_client_disconnected();
        return;
    }

    // The client only talks to us to close; pings are answered by axum.
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("Failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Updates were lost; resynchronize with a fresh snapshot.
                        warn!(skipped = n, "WebSocket client lagged, resending snapshot");
                        let (snapshot, rx) = state.subscribe();
                        broadcast_rx = rx;
                        if !send_snapshot(&mut sender, snapshot).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing connection");
                break;
            }
        }
    }

    incoming_task.abort();
    drop(guard);
    Metrics::dashboard_client_disconnected();
    info!("WebSocket connection closed");
}

/// Returns false once the client is gone.
async fn send_snapshot(sender: &mut SplitSink<WebSocket, Message>, snapshot: CockpitSnapshot) -> bool {
    match serde_json::to_string(&DashboardMessage::Snapshot(snapshot)) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize snapshot");
            true
        }
    }
}

/// Bind the listener for [`serve`].
pub async fn bind(config: &DashboardConfig) -> DashboardResult<TcpListener> {
    let addr = config.bind_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| DashboardError::Bind { addr, source })
}

/// Serve the dashboard on an already bound listener until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Starting dashboard server");
    }

    let app = create_router(AppState::new(dashboard_state, config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}

/// Run the dashboard HTTP server.
pub async fn run_server(
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let listener = bind(&config).await?;
    serve(listener, dashboard_state, config, shutdown).await
}
