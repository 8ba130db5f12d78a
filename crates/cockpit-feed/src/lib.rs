//! Market event reconciliation for the trading cockpit.
//!
//! Turns the raw frames of the market stream into render-ready view state:
//! - `EnvelopeParser`: tag validation and kind-specific payload decoding
//! - `CandleSeries`: snapshot/tick merge into one OHLC series
//! - `sanitize`: untrusted chart studies into typed overlay annotations
//! - `classify`: operator log entries with structured analysis fields
//! - `Reconciler`: owns all views and dispatches each event to them

pub mod analysis;
pub mod candles;
pub mod envelope;
pub mod error;
pub mod overlay;
pub mod reconciler;

pub use analysis::{
    classify, classify_line, parse_analysis, AnalysisField, AnalysisLine, EventLog, LogEntry,
    ParsedAnalysis, ANALYSIS_RULES,
};
pub use candles::{CandleSeries, SeriesChange};
pub use envelope::{Envelope, EnvelopeParser, EventBody, MarketUpdate, VisualStudies};
pub use error::{FeedError, FeedResult};
pub use overlay::{sanitize, sanitize_trend_lines, LevelInput, OverlaySet};
pub use reconciler::{FeedStats, Reconciler, ViewSnapshot, ViewUpdate};
