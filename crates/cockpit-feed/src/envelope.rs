//! Event envelope parsing.
//!
//! Every inbound frame is a JSON object tagged by `kind` (the producer also
//! sends the tag as `type`). Log-kind events carry an `id` and a `message`;
//! `market_data` events carry at most one of `candles`/`tick` plus an
//! optional `marker`; `ai_analysis` events may carry `estudos_visuais`.

use crate::error::{FeedError, FeedResult};
use cockpit_core::{Candle, EventKind, Tick, TradeMarker};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Wire shape before validation. Every payload field stays loose here.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default, rename = "type")]
    type_tag: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    candles: Option<Value>,
    #[serde(default)]
    tick: Option<Value>,
    #[serde(default)]
    marker: Option<Value>,
    #[serde(default)]
    estudos_visuais: Option<Value>,
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: EventKind,
    /// Display-formatted, not necessarily sortable.
    pub timestamp: String,
    pub id: String,
    /// Empty when the producer sent none.
    pub message: String,
    pub body: EventBody,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Log,
    Analysis {
        studies: Option<VisualStudies>,
    },
    Market {
        update: Option<MarketUpdate>,
        marker: Option<TradeMarker>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketUpdate {
    Snapshot(Vec<Candle>),
    Tick(Tick),
}

/// Untrusted chart studies, kept as raw JSON until the overlay sanitizer decodes them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualStudies {
    pub support_resistance: Vec<Value>,
    pub fibonacci: Vec<Value>,
    pub trend_lines: Vec<Value>,
}

impl VisualStudies {
    /// Returns `None` unless `value` is an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let list = |key: &str| match obj.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        };

        Some(Self {
            support_resistance: list("suporte_resistencia"),
            fibonacci: list("fibo_proposals"),
            trend_lines: list("linhas_tendencia"),
        })
    }

    pub fn element_count(&self) -> usize {
        self.support_resistance.len() + self.fibonacci.len() + self.trend_lines.len()
    }
}

/// Stateful parser; derives ids for events that arrive without one.
#[derive(Debug, Default)]
pub struct EnvelopeParser {
    derived_ids: u64,
}

impl EnvelopeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate one raw frame.
    pub fn parse(&mut self, raw: &str) -> FeedResult<Envelope> {
        let raw: RawEnvelope = serde_json::from_str(raw)?;

        let kind_tag = raw
            .kind
            .or(raw.type_tag)
            .ok_or(FeedError::MissingField("kind"))?;
        let kind: EventKind = kind_tag
            .parse()
            .map_err(|_| FeedError::UnknownKind(kind_tag.clone()))?;

        let timestamp = raw.timestamp.as_ref().map(text_of).unwrap_or_default();
        let message = raw.message.as_ref().map(text_of).unwrap_or_default();

        let id = match raw.id.as_ref().map(text_of).filter(|id| !id.is_empty()) {
            Some(id) => id,
            None if kind.is_log() => return Err(FeedError::MissingField("id")),
            None => {
                self.derived_ids += 1;
                format!("md-{}", self.derived_ids)
            }
        };

        let body = match kind {
            EventKind::MarketData => parse_market(raw.candles, raw.tick, raw.marker)?,
            EventKind::AiAnalysis => EventBody::Analysis {
                studies: raw.estudos_visuais.as_ref().and_then(VisualStudies::from_value),
            },
            _ => EventBody::Log,
        };

        debug!(%kind, %id, "Parsed envelope");

        Ok(Envelope {
            kind,
            timestamp,
            id,
            message,
            body,
        })
    }
}

fn parse_market(
    candles: Option<Value>,
    tick: Option<Value>,
    marker: Option<Value>,
) -> FeedResult<EventBody> {
    let update = match (candles, tick) {
        (Some(_), Some(_)) => return Err(FeedError::AmbiguousMarketData),
        (Some(candles), None) => {
            let candles: Vec<Candle> = serde_json::from_value(candles)
                .map_err(|e| FeedError::InvalidCandles(e.to_string()))?;
            Some(MarketUpdate::Snapshot(candles))
        }
        (None, Some(tick)) => {
            let tick: Tick =
                serde_json::from_value(tick).map_err(|e| FeedError::InvalidTick(e.to_string()))?;
            if !tick.is_valid() {
                return Err(FeedError::InvalidTick(format!("price {}", tick.price)));
            }
            Some(MarketUpdate::Tick(tick))
        }
        (None, None) => None,
    };

    let marker = marker
        .map(|m| {
            serde_json::from_value::<TradeMarker>(m)
                .map_err(|e| FeedError::InvalidMarker(e.to_string()))
        })
        .transpose()?;

    Ok(EventBody::Market { update, marker })
}

/// Render a loose scalar as text. Strings are taken verbatim.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
