//! Overlay sanitizer.
//!
//! Chart studies come from the analysis engine and are untrusted: elements may
//! be numbers, numeric strings, objects with a `price`/`level`, or garbage.
//! Each element is decoded into a [`LevelInput`] and only finite positive
//! prices become annotations. A bad element drops itself, never the batch.

use cockpit_core::{is_valid_price, ChartTime, OverlayAnnotation, OverlayKind, TrendLine, TrendPoint};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// One decoded study element.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelInput {
    /// Bare number or numeric string.
    Numeric(f64),
    /// Object carrying a price and optionally a level tag (e.g. `"61.8"`).
    Structured { price: f64, level: Option<String> },
    /// Anything else, with the reason it was not understood.
    Malformed(String),
}

impl LevelInput {
    pub fn decode(value: &Value, kind: OverlayKind) -> Self {
        match value {
            Value::Number(_) | Value::String(_) => match coerce_number(value) {
                Some(price) => Self::Numeric(price),
                None => Self::Malformed(format!("not a number: {value}")),
            },
            Value::Object(obj) => {
                let price = obj.get("price").and_then(coerce_number).or_else(|| {
                    // A bare S/R level is a price; a Fibonacci level is a ratio.
                    match kind {
                        OverlayKind::SupportResistance => obj.get("level").and_then(coerce_number),
                        OverlayKind::Fibonacci => None,
                    }
                });
                let level = match kind {
                    OverlayKind::Fibonacci => obj.get("level").and_then(level_tag),
                    OverlayKind::SupportResistance => None,
                };

                match price {
                    Some(price) => Self::Structured { price, level },
                    None => Self::Malformed("object without a numeric price".to_string()),
                }
            }
            other => Self::Malformed(format!("unsupported element: {other}")),
        }
    }

    /// Turn a decoded element into an annotation, enforcing the price invariant.
    pub fn into_annotation(self, kind: OverlayKind) -> Result<OverlayAnnotation, String> {
        let (price, level) = match self {
            Self::Numeric(price) => (price, None),
            Self::Structured { price, level } => (price, level),
            Self::Malformed(reason) => return Err(reason),
        };

        if !is_valid_price(price) {
            return Err(format!("price out of range: {price}"));
        }

        Ok(OverlayAnnotation {
            price,
            label: label_for(kind, level.as_deref()),
            kind,
        })
    }
}

fn label_for(kind: OverlayKind, level: Option<&str>) -> String {
    match (kind, level) {
        (OverlayKind::SupportResistance, _) => "S/R".to_string(),
        (OverlayKind::Fibonacci, Some(level)) => format!("Fibo {level}%"),
        (OverlayKind::Fibonacci, None) => "Fibo".to_string(),
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn level_tag(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert raw study elements into annotations, preserving input order.
pub fn sanitize(raw: &[Value], kind: OverlayKind) -> Vec<OverlayAnnotation> {
    raw.iter()
        .filter_map(|value| {
            match LevelInput::decode(value, kind).into_annotation(kind) {
                Ok(annotation) => Some(annotation),
                Err(reason) => {
                    debug!(%kind, %reason, "Dropping overlay element");
                    None
                }
            }
        })
        .collect()
}

/// Convert raw `linhas_tendencia` elements into trend lines.
///
/// Elements look like `{id, p1: {time, price}, p2: {time, price}}`. A line is
/// dropped when either end is unusable. Missing ids are derived from position.
pub fn sanitize_trend_lines(raw: &[Value]) -> Vec<TrendLine> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let line = decode_trend_line(index, value);
            if line.is_none() {
                debug!(index, "Dropping trend line");
            }
            line
        })
        .collect()
}

fn decode_trend_line(index: usize, value: &Value) -> Option<TrendLine> {
    let obj = value.as_object()?;
    let id = obj
        .get("id")
        .and_then(level_tag)
        .unwrap_or_else(|| format!("trend-{index}"));

    let line = TrendLine {
        id,
        start: decode_point(obj.get("p1")?)?,
        end: decode_point(obj.get("p2")?)?,
    };
    line.is_valid().then_some(line)
}

fn decode_point(value: &Value) -> Option<TrendPoint> {
    let obj = value.as_object()?;
    let time: ChartTime = serde_json::from_value(obj.get("time")?.clone()).ok()?;
    let price = obj.get("price").and_then(coerce_number)?;
    Some(TrendPoint { time, price })
}

/// The current set of chart studies. Replaced wholesale, never diffed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlaySet {
    /// Bumped on every replacement so renderers can retract stale lines.
    pub revision: u64,
    pub annotations: Vec<OverlayAnnotation>,
    pub trend_lines: Vec<TrendLine>,
}

impl OverlaySet {
    pub fn replace(&mut self, annotations: Vec<OverlayAnnotation>, trend_lines: Vec<TrendLine>) {
        self.revision += 1;
        self.annotations = annotations;
        self.trend_lines = trend_lines;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new(), Vec::new());
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.trend_lines.is_empty()
    }
}
