//! Trade markers.

use crate::candle::ChartTime;
use serde::{Deserialize, Serialize};

/// Side of the bar the marker is drawn on.
///
/// Serialized in the chart's `aboveBar`/`belowBar` vocabulary; the short
/// forms are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerPosition {
    #[serde(rename = "aboveBar", alias = "above")]
    Above,
    #[serde(rename = "belowBar", alias = "below")]
    Below,
}

/// Glyph of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    Circle,
    Square,
    ArrowUp,
    ArrowDown,
}

/// Execution marker attached to a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMarker {
    pub time: ChartTime,
    pub position: MarkerPosition,
    pub shape: MarkerShape,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}
