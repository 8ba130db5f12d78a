//! View-state reconciler.
//!
//! Owns the three views derived from the market stream (candles, overlays,
//! operator log) plus the trade marker list, and turns each inbound frame into
//! a list of [`ViewUpdate`]s for the renderer. Only one frame is applied at a
//! time; the owner decides the reconciler's lifetime.

use crate::analysis::{classify, EventLog, LogEntry};
use crate::candles::{CandleSeries, SeriesChange};
use crate::envelope::{Envelope, EnvelopeParser, EventBody, MarketUpdate, VisualStudies};
use crate::error::FeedResult;
use crate::overlay::{sanitize, sanitize_trend_lines, OverlaySet};
use cockpit_core::{Candle, OverlayKind, TradeMarker};
use serde::Serialize;
use tracing::{debug, warn};

/// Render instruction produced by one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "update", content = "data", rename_all = "snake_case")]
pub enum ViewUpdate {
    /// Redraw the whole candle series.
    CandlesReplaced(Vec<Candle>),
    /// Redraw only the last bar.
    LastCandleUpdated(Candle),
    /// Retract all overlay lines and draw this set.
    OverlaysReplaced(OverlaySet),
    MarkerAdded(TradeMarker),
    MarkersCleared,
    LogAppended(LogEntry),
    /// Instrument changed; every chart view is empty again.
    Reset,
}

impl ViewUpdate {
    /// Wire name of the variant.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CandlesReplaced(_) => "candles_replaced",
            Self::LastCandleUpdated(_) => "last_candle_updated",
            Self::OverlaysReplaced(_) => "overlays_replaced",
            Self::MarkerAdded(_) => "marker_added",
            Self::MarkersCleared => "markers_cleared",
            Self::LogAppended(_) => "log_appended",
            Self::Reset => "reset",
        }
    }
}

/// Full render-ready state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub candles: Vec<Candle>,
    pub overlays: OverlaySet,
    pub markers: Vec<TradeMarker>,
    pub log: Vec<LogEntry>,
}

impl ViewSnapshot {
    /// Apply one update the way a renderer would. Replaying every update a
    /// reconciler produced yields that reconciler's own snapshot.
    pub fn apply(&mut self, update: &ViewUpdate, max_log_entries: usize) {
        match update {
            ViewUpdate::CandlesReplaced(candles) => self.candles = candles.clone(),
            ViewUpdate::LastCandleUpdated(candle) => match self.candles.last_mut() {
                Some(last) => *last = candle.clone(),
                None => self.candles.push(candle.clone()),
            },
            ViewUpdate::OverlaysReplaced(overlays) => self.overlays = overlays.clone(),
            ViewUpdate::MarkerAdded(marker) => self.markers.push(marker.clone()),
            ViewUpdate::MarkersCleared => self.markers.clear(),
            ViewUpdate::LogAppended(entry) => {
                self.log.push(entry.clone());
                if max_log_entries > 0 && self.log.len() > max_log_entries {
                    let excess = self.log.len() - max_log_entries;
                    self.log.drain(..excess);
                }
            }
            ViewUpdate::Reset => {
                self.candles.clear();
                self.markers.clear();
                self.overlays.clear();
            }
        }
    }
}

/// Counters kept by the reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub snapshots_applied: u64,
    pub ticks_applied: u64,
    /// Ticks that arrived before any snapshot.
    pub ticks_ignored: u64,
    pub overlay_elements_dropped: u64,
    pub log_entries: u64,
}

pub struct Reconciler {
    parser: EnvelopeParser,
    candles: CandleSeries,
    overlays: OverlaySet,
    markers: Vec<TradeMarker>,
    log: EventLog,
    stats: FeedStats,
}

impl Reconciler {
    /// Create an empty reconciler. `max_log_entries = 0` keeps the whole log.
    pub fn new(max_log_entries: usize) -> Self {
        Self {
            parser: EnvelopeParser::new(),
            candles: CandleSeries::new(),
            overlays: OverlaySet::default(),
            markers: Vec::new(),
            log: EventLog::new(max_log_entries),
            stats: FeedStats::default(),
        }
    }

    /// Parse and apply one raw frame.
    ///
    /// A malformed frame changes nothing; the error is returned so the caller
    /// can count it, and the frame is discarded.
    pub fn handle_frame(&mut self, raw: &str) -> FeedResult<Vec<ViewUpdate>> {
        self.stats.frames_received += 1;

        match self.parser.parse(raw) {
            Ok(envelope) => Ok(self.apply(envelope)),
            Err(e) => {
                self.stats.frames_discarded += 1;
                warn!(error = %e, frame_len = raw.len(), "Discarding malformed frame");
                Err(e)
            }
        }
    }

    /// Dispatch a validated event to the views it affects.
    pub fn apply(&mut self, envelope: Envelope) -> Vec<ViewUpdate> {
        let mut updates = Vec::new();
        let entry = envelope.kind.is_log().then(|| classify(&envelope));

        match envelope.body {
            EventBody::Market { update, marker } => {
                match update {
                    Some(MarketUpdate::Snapshot(candles)) => {
                        self.apply_snapshot(candles, &mut updates);
                    }
                    Some(MarketUpdate::Tick(tick)) => match self.candles.apply_tick(tick) {
                        Some(SeriesChange::UpdateLast(candle)) => {
                            self.stats.ticks_applied += 1;
                            updates.push(ViewUpdate::LastCandleUpdated(candle));
                        }
                        Some(SeriesChange::ReplaceAll(candles)) => {
                            updates.push(ViewUpdate::CandlesReplaced(candles));
                        }
                        None => {
                            self.stats.ticks_ignored += 1;
                            debug!(price = tick.price, "Tick before any snapshot, ignored");
                        }
                    },
                    None => {}
                }

                if let Some(marker) = marker {
                    self.markers.push(marker.clone());
                    updates.push(ViewUpdate::MarkerAdded(marker));
                }
            }
            EventBody::Analysis {
                studies: Some(studies),
            } => {
                self.apply_studies(&studies);
                updates.push(ViewUpdate::OverlaysReplaced(self.overlays.clone()));
            }
            EventBody::Analysis { studies: None } | EventBody::Log => {}
        }

        if let Some(entry) = entry {
            self.log.push(entry.clone());
            self.stats.log_entries += 1;
            updates.push(ViewUpdate::LogAppended(entry));
        }

        updates
    }

    fn apply_snapshot(&mut self, candles: Vec<Candle>, updates: &mut Vec<ViewUpdate>) {
        if let SeriesChange::ReplaceAll(candles) = self.candles.apply_snapshot(candles) {
            self.stats.snapshots_applied += 1;
            updates.push(ViewUpdate::CandlesReplaced(candles));
        }

        // Markers belong to the history a snapshot replaces.
        if !self.markers.is_empty() {
            self.markers.clear();
            updates.push(ViewUpdate::MarkersCleared);
        }
    }

    fn apply_studies(&mut self, studies: &VisualStudies) {
        let mut annotations = sanitize(&studies.support_resistance, OverlayKind::SupportResistance);
        annotations.extend(sanitize(&studies.fibonacci, OverlayKind::Fibonacci));
        let trend_lines = sanitize_trend_lines(&studies.trend_lines);

        let dropped = studies.element_count() - annotations.len() - trend_lines.len();
        if dropped > 0 {
            debug!(dropped, "Overlay elements dropped");
            self.stats.overlay_elements_dropped += dropped as u64;
        }

        self.overlays.replace(annotations, trend_lines);
    }

    /// Clear every chart view (instrument change). The operator log is kept.
    pub fn reset(&mut self) -> ViewUpdate {
        self.candles.clear();
        self.markers.clear();
        self.overlays.clear();
        ViewUpdate::Reset
    }

    pub fn candles(&self) -> &[Candle] {
        self.candles.as_slice()
    }

    pub fn overlays(&self) -> &OverlaySet {
        &self.overlays
    }

    pub fn markers(&self) -> &[TradeMarker] {
        &self.markers
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            candles: self.candles.as_slice().to_vec(),
            overlays: self.overlays.clone(),
            markers: self.markers.clone(),
            log: self.log.to_vec(),
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(0)
    }
}
