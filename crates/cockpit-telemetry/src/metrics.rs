//! Prometheus metrics for the trading cockpit.
//!
//! Covers:
//! - Connection state and reconnections
//! - Frame intake, discards by reason, and processing latency
//! - Render updates and overlay element drops
//! - Control-plane status, reachability and command outcomes
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which must crash at startup rather than fail
//! silently. These panics can only happen during static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, register_int_gauge, Counter, CounterVec, Encoder, Gauge, GaugeVec,
    Histogram, IntGauge, TextEncoder,
};

/// WebSocket connection state (1 = connected, 0 = otherwise).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "cockpit_ws_connected",
        "WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "cockpit_ws_state",
        "WebSocket state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cockpit_ws_reconnect_total",
        "Total WebSocket reconnection attempts"
    )
    .unwrap()
});

pub static WS_DIAGNOSTICS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cockpit_ws_diagnostics_total",
        "Connection failures reported as diagnostics"
    )
    .unwrap()
});

pub static FRAMES_RECEIVED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cockpit_frames_received_total",
        "Total frames received from the market stream"
    )
    .unwrap()
});

/// Labels: reason (json/missing_field/unknown_kind/...)
pub static FRAMES_DISCARDED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cockpit_frames_discarded_total",
        "Malformed frames discarded",
        &["reason"]
    )
    .unwrap()
});

pub static FRAME_PROCESSING_US: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "cockpit_frame_processing_us",
        "Time to parse and apply one frame in microseconds",
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Labels: update (candles_replaced/last_candle_updated/overlays_replaced/...)
pub static VIEW_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cockpit_view_updates_total",
        "Render updates produced by the reconciler",
        &["update"]
    )
    .unwrap()
});

pub static OVERLAY_ELEMENTS_DROPPED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cockpit_overlay_elements_dropped_total",
        "Chart study elements dropped by the sanitizer"
    )
    .unwrap()
});

/// Labels: status (OFFLINE/LOADING/ONLINE)
pub static ENGINE_STATUS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "cockpit_engine_status",
        "Last polled engine status (1=active, 0=inactive)",
        &["status"]
    )
    .unwrap()
});

pub static CONTROL_REACHABLE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "cockpit_control_reachable",
        "Whether the last control-plane poll succeeded"
    )
    .unwrap()
});

/// Labels: outcome (confirmed/timed_out/failed)
pub static COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cockpit_commands_total",
        "Engine commands by final outcome",
        &["outcome"]
    )
    .unwrap()
});

pub static DASHBOARD_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "cockpit_dashboard_clients",
        "Connected dashboard WebSocket clients"
    )
    .unwrap()
});

const WS_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "reconnecting"];
const ENGINE_STATUSES: [&str; 3] = ["OFFLINE", "LOADING", "ONLINE"];

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set the connection state. Only the active state is 1.
    pub fn ws_state_set(state: &str) {
        for s in WS_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn ws_reconnect() {
        WS_RECONNECT_TOTAL.inc();
    }

    pub fn ws_diagnostic() {
        WS_DIAGNOSTICS_TOTAL.inc();
    }

    pub fn frame_received() {
        FRAMES_RECEIVED_TOTAL.inc();
    }

    pub fn frame_discarded(reason: &str) {
        FRAMES_DISCARDED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn frame_processing(micros: f64) {
        FRAME_PROCESSING_US.observe(micros);
    }

    pub fn view_update(update: &str) {
        VIEW_UPDATES_TOTAL.with_label_values(&[update]).inc();
    }

    pub fn overlay_elements_dropped(count: u64) {
        OVERLAY_ELEMENTS_DROPPED_TOTAL.inc_by(count as f64);
    }

    /// Set the engine status. Only the active status is 1.
    pub fn engine_status_set(status: &str) {
        for s in ENGINE_STATUSES {
            ENGINE_STATUS.with_label_values(&[s]).set(0.0);
        }
        ENGINE_STATUS.with_label_values(&[status]).set(1.0);
    }

    pub fn control_reachable(reachable: bool) {
        CONTROL_REACHABLE.set(if reachable { 1.0 } else { 0.0 });
    }

    pub fn command_outcome(outcome: &str) {
        COMMANDS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn dashboard_client_connected() {
        DASHBOARD_CLIENTS.inc();
    }

    pub fn dashboard_client_disconnected() {
        DASHBOARD_CLIENTS.dec();
    }
}

/// Encode every registered metric in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| TelemetryError::Encoding(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Encoding(e.to_string()))
}
