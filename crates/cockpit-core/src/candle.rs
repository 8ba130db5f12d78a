//! OHLC series primitives.
//!
//! A candle series is ordered by `time` ascending with no duplicate times.
//! Every price carried by a candle or a tick is finite and strictly positive.

use serde::{Deserialize, Serialize};

/// Check the price invariant shared by candles, ticks and overlays.
#[inline]
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Horizontal coordinate of a bar.
///
/// The chart accepts either unix seconds or a `YYYY-MM-DD` business day.
/// Business days are zero-padded, so lexical order is chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartTime {
    Timestamp(i64),
    BusinessDay(String),
}

impl std::fmt::Display for ChartTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp(ts) => write!(f, "{ts}"),
            Self::BusinessDay(day) => f.write_str(day),
        }
    }
}

impl From<i64> for ChartTime {
    fn from(ts: i64) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<i32> for ChartTime {
    fn from(ts: i32) -> Self {
        Self::Timestamp(i64::from(ts))
    }
}

impl From<&str> for ChartTime {
    fn from(day: &str) -> Self {
        Self::BusinessDay(day.to_string())
    }
}

/// Open-high-low-close bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: ChartTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(time: impl Into<ChartTime>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time: time.into(),
            open,
            high,
            low,
            close,
        }
    }

    /// All four prices satisfy the price invariant.
    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .into_iter()
            .all(is_valid_price)
    }

    /// Merge a tick into this bar.
    ///
    /// `open` and `time` are kept; `close` becomes the tick price and the
    /// range widens to include it.
    pub fn with_tick(&self, price: f64) -> Self {
        Self {
            time: self.time.clone(),
            open: self.open,
            high: self.high.max(price),
            low: self.low.min(price),
            close: price,
        }
    }
}

/// Single incremental price update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
}

impl Tick {
    pub fn new(price: f64) -> Self {
        Self { price }
    }

    pub fn is_valid(&self) -> bool {
        is_valid_price(self.price)
    }
}
