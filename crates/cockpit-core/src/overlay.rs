//! Chart studies drawn over the candle series.

use crate::candle::{is_valid_price, ChartTime};
use serde::{Deserialize, Serialize};

/// Family of a horizontal price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    SupportResistance,
    Fibonacci,
}

impl std::fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SupportResistance => write!(f, "support_resistance"),
            Self::Fibonacci => write!(f, "fibonacci"),
        }
    }
}

/// Horizontal price line with a label.
///
/// Only constructed by the overlay sanitizer, which guarantees a finite
/// positive price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayAnnotation {
    pub price: f64,
    pub label: String,
    pub kind: OverlayKind,
}

/// One end of a trend line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub time: ChartTime,
    pub price: f64,
}

/// Two-point line segment proposed by the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub id: String,
    pub start: TrendPoint,
    pub end: TrendPoint,
}

impl TrendLine {
    pub fn is_valid(&self) -> bool {
        is_valid_price(self.start.price) && is_valid_price(self.end.price)
    }
}
