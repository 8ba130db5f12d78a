//! Candle reconciler.
//!
//! Merges full snapshots and per-tick updates into one OHLC series. The
//! returned [`SeriesChange`] tells the renderer whether to redraw everything
//! or only the last bar.

use cockpit_core::{Candle, Tick};
use tracing::debug;

/// What a renderer must do after a series mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesChange {
    /// Redraw the whole series.
    ReplaceAll(Vec<Candle>),
    /// Only the last bar changed.
    UpdateLast(Candle),
}

/// Ordered, duplicate-free candle series.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire series.
    ///
    /// A sorted, valid snapshot is stored unchanged. Candles violating the
    /// price invariant are dropped; unsorted input is stably sorted by time
    /// and the last candle of a duplicated time wins.
    pub fn apply_snapshot(&mut self, candles: Vec<Candle>) -> SeriesChange {
        let received = candles.len();
        self.candles = normalize_snapshot(candles);

        if self.candles.len() != received {
            debug!(
                received,
                kept = self.candles.len(),
                "Snapshot normalized"
            );
        }

        SeriesChange::ReplaceAll(self.candles.clone())
    }

    /// Merge a tick into the last candle. No-op on an empty series or an invalid price.
    pub fn apply_tick(&mut self, tick: Tick) -> Option<SeriesChange> {
        if !tick.is_valid() {
            debug!(price = tick.price, "Ignoring tick with invalid price");
            return None;
        }

        let last = self.candles.last_mut()?;
        *last = last.with_tick(tick.price);
        Some(SeriesChange::UpdateLast(last.clone()))
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

fn normalize_snapshot(candles: Vec<Candle>) -> Vec<Candle> {
    let mut candles: Vec<Candle> = candles.into_iter().filter(Candle::is_valid).collect();

    if candles.windows(2).all(|pair| pair[0].time < pair[1].time) {
        return candles;
    }

    candles.sort_by(|a, b| a.time.cmp(&b.time));

    let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match deduped.last_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            _ => deduped.push(candle),
        }
    }
    deduped
}
