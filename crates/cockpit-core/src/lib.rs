//! Core domain types for the trading cockpit.
//!
//! This crate provides the types shared by every stage of the event pipeline:
//! - `EventKind`: Tag of an inbound stream event
//! - `Candle`, `Tick`, `ChartTime`: OHLC series primitives
//! - `OverlayAnnotation`, `TrendLine`: Chart studies supplied by the analysis engine
//! - `TradeMarker`: Execution markers drawn on the chart
//! - `EngineStatus`, `EngineCommand`: Control-plane run state

pub mod candle;
pub mod engine;
pub mod error;
pub mod event;
pub mod marker;
pub mod overlay;

pub use candle::{is_valid_price, Candle, ChartTime, Tick};
pub use engine::{EngineCommand, EngineStatus};
pub use error::{CoreError, Result};
pub use event::EventKind;
pub use marker::{MarkerPosition, MarkerShape, TradeMarker};
pub use overlay::{OverlayAnnotation, OverlayKind, TrendLine, TrendPoint};
