//! End-to-end scenarios through `Reconciler::handle_frame`.
//!
//! Each test replays a short, realistic stream and checks the derived views.

use cockpit_core::{Candle, ChartTime, EventKind, OverlayKind};
use cockpit_feed::{AnalysisField, FeedError, Reconciler, ViewUpdate};

const SNAPSHOT: &str = r#"{
    "kind": "market_data",
    "timestamp": "10:00:00",
    "candles": [
        {"time": 1, "open": 1.07, "high": 1.075, "low": 1.068, "close": 1.08},
        {"time": 2, "open": 1.08, "high": 1.082, "low": 1.079, "close": 1.081}
    ]
}"#;

#[test]
fn test_snapshot_then_tick_updates_last_bar() {
    let mut r = Reconciler::default();

    let updates = r.handle_frame(SNAPSHOT).expect("snapshot frame");
    assert!(matches!(updates.as_slice(), [ViewUpdate::CandlesReplaced(c)] if c.len() == 2));

    let updates = r
        .handle_frame(r#"{"kind":"market_data","tick":{"price":1.085}}"#)
        .expect("tick frame");

    let expected = Candle::new(2, 1.08, 1.085, 1.079, 1.085);
    assert_eq!(updates, vec![ViewUpdate::LastCandleUpdated(expected.clone())]);
    assert_eq!(r.candles()[0], Candle::new(1, 1.07, 1.075, 1.068, 1.08));
    assert_eq!(r.candles()[1], expected);
}

#[test]
fn test_tick_before_snapshot_is_noop() {
    let mut r = Reconciler::default();
    let updates = r
        .handle_frame(r#"{"kind":"market_data","tick":{"price":1.1}}"#)
        .unwrap();

    assert!(updates.is_empty());
    assert!(r.candles().is_empty());
    assert_eq!(r.stats().ticks_ignored, 1);
}

#[test]
fn test_trade_marker_flow_and_snapshot_clears_markers() {
    let mut r = Reconciler::default();
    r.handle_frame(SNAPSHOT).unwrap();

    let updates = r
        .handle_frame(
            r#"{"kind":"market_data","tick":{"price":1.09},
                "marker":{"time":2,"position":"belowBar","shape":"arrowUp","text":"BUY @ 1.09"}}"#,
        )
        .unwrap();
    assert_eq!(updates.len(), 2);
    assert!(matches!(updates[1], ViewUpdate::MarkerAdded(ref m) if m.time == ChartTime::Timestamp(2)));
    assert_eq!(r.markers().len(), 1);

    r.handle_frame(
        r#"{"kind":"market_data","marker":{"time":2,"position":"aboveBar","shape":"arrowDown","text":"SELL"}}"#,
    )
    .unwrap();
    assert_eq!(r.markers().len(), 2);

    let updates = r.handle_frame(SNAPSHOT).unwrap();
    assert!(updates.contains(&ViewUpdate::MarkersCleared));
    assert!(r.markers().is_empty());
}

#[test]
fn test_analysis_event_feeds_log_and_overlays() {
    let mut r = Reconciler::default();
    r.handle_frame(SNAPSHOT).unwrap();

    let frame = serde_json::json!({
        "id": "ai-1",
        "timestamp": "10:05:00",
        "type": "ai_analysis",
        "message": "Ativo: EURUSD | Decisão: BUY\nRegime: Alta\nMotivo: Suporte respeitado\nnota livre",
        "estudos_visuais": {
            "suporte_resistencia": [{"price": "abc"}, {"price": 1.2345}, -1],
            "fibo_proposals": [{"level": "61.8", "price": 1.0850}],
            "linhas_tendencia": [
                {"id": "lt1", "p1": {"time": 1, "price": 1.07}, "p2": {"time": 2, "price": 1.08}}
            ]
        }
    })
    .to_string();

    let updates = r.handle_frame(&frame).unwrap();
    assert_eq!(updates.len(), 2);

    let overlays = r.overlays();
    assert_eq!(overlays.annotations.len(), 2);
    assert_eq!(overlays.annotations[0].price, 1.2345);
    assert_eq!(overlays.annotations[0].kind, OverlayKind::SupportResistance);
    assert_eq!(overlays.annotations[1].label, "Fibo 61.8%");
    assert_eq!(overlays.trend_lines.len(), 1);

    let entry = r.log().iter().last().unwrap();
    assert_eq!(entry.kind, EventKind::AiAnalysis);
    let analysis = entry.analysis.as_ref().unwrap();
    assert_eq!(analysis.headline, "Ativo: EURUSD | Decisão: BUY");
    let fields: Vec<AnalysisField> = analysis.fields.iter().map(|l| l.field).collect();
    assert_eq!(
        fields,
        vec![AnalysisField::Regime, AnalysisField::Reason, AnalysisField::Other]
    );

    // The candle series is untouched by analysis events.
    assert_eq!(r.candles().len(), 2);
}

#[test]
fn test_new_studies_fully_replace_old_ones() {
    let mut r = Reconciler::default();
    r.handle_frame(
        r#"{"id":"1","kind":"ai_analysis","estudos_visuais":{"suporte_resistencia":[1.1,1.2,1.3]}}"#,
    )
    .unwrap();
    let first_revision = r.overlays().revision;

    r.handle_frame(
        r#"{"id":"2","kind":"ai_analysis","estudos_visuais":{"fibo_proposals":[{"level":"50","price":1.15}]}}"#,
    )
    .unwrap();

    let overlays = r.overlays();
    assert!(overlays.revision > first_revision);
    assert_eq!(overlays.annotations.len(), 1);
    assert_eq!(overlays.annotations[0].kind, OverlayKind::Fibonacci);
}

#[test]
fn test_log_preserves_arrival_order_across_kinds() {
    let mut r = Reconciler::default();
    let frames = [
        r#"{"id":"1","type":"info","message":"Conectado"}"#,
        r#"{"kind":"market_data","tick":{"price":1.0}}"#,
        r#"{"id":"2","type":"warning","message":"Spread alto"}"#,
        r#"{"id":"3","type":"trade","message":"BUY 0.1 EURUSD"}"#,
        r#"{"id":"4","type":"error"}"#,
    ];
    for frame in frames {
        r.handle_frame(frame).unwrap();
    }

    let ids: Vec<&str> = r.log().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert_eq!(r.log().iter().last().unwrap().message, "");
}

#[test]
fn test_stream_survives_garbage_between_valid_frames() {
    let mut r = Reconciler::default();
    let frames = [
        SNAPSHOT,
        "",
        "null",
        r#"{"kind":"unknown_kind","id":"x"}"#,
        r#"{"kind":"market_data","candles":[],"tick":{"price":1.0}}"#,
        r#"{"kind":"market_data","tick":{"price":1.2}}"#,
    ];

    let results: Vec<_> = frames.iter().map(|f| r.handle_frame(f)).collect();

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(FeedError::Json(_))));
    assert!(results[2].is_err());
    assert!(matches!(results[3], Err(FeedError::UnknownKind(_))));
    assert!(matches!(results[4], Err(FeedError::AmbiguousMarketData)));
    assert!(results[5].is_ok());

    assert_eq!(r.candles()[1].close, 1.2);
    assert_eq!(r.stats().frames_discarded, 4);
}
