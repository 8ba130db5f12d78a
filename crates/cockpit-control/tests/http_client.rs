//! Wire-format tests for `ControlPlaneClient` against a mock control plane.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use cockpit_control::{ControlError, ControlPlane, ControlPlaneClient, DEFAULT_TIMEOUT};
use cockpit_core::{EngineCommand, EngineStatus};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Clone, Default)]
struct MockControlPlane {
    status: Arc<Mutex<Value>>,
    writes: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn status(State(mock): State<MockControlPlane>) -> Json<Value> {
    Json(mock.status.lock().clone())
}

async fn record(path: &str, mock: &MockControlPlane, body: Value) -> StatusCode {
    mock.writes.lock().push((path.to_string(), body));
    StatusCode::OK
}

async fn command(State(mock): State<MockControlPlane>, Json(body): Json<Value>) -> StatusCode {
    record("command", &mock, body).await
}

async fn select_asset(State(mock): State<MockControlPlane>, Json(body): Json<Value>) -> StatusCode {
    record("select_asset", &mock, body).await
}

async fn replay_speed(State(mock): State<MockControlPlane>, Json(body): Json<Value>) -> StatusCode {
    record("set_replay_speed", &mock, body).await
}

async fn start_mock(mock: MockControlPlane) -> String {
    let app = Router::new()
        .route("/api/engine/status", get(status))
        .route("/api/engine/command", post(command))
        .route("/api/select_asset", post(select_asset))
        .route("/api/set_replay_speed", post(replay_speed))
        .with_state(mock);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_fetch_engine_status() {
    let mock = MockControlPlane::default();
    let id = Uuid::new_v4();
    *mock.status.lock() = json!({"status": "ONLINE", "last_command_id": id.to_string()});
    let base = start_mock(mock).await;

    let client = ControlPlaneClient::new(base, DEFAULT_TIMEOUT).unwrap();
    let report = client.fetch_engine_status().await.unwrap();

    assert_eq!(report.status, EngineStatus::Online);
    assert_eq!(report.last_command_id, Some(id));
}

#[tokio::test]
async fn test_unknown_status_is_decode_error() {
    let mock = MockControlPlane::default();
    *mock.status.lock() = json!({"status": "PAUSED"});
    let base = start_mock(mock).await;

    let client = ControlPlaneClient::new(base, DEFAULT_TIMEOUT).unwrap();
    assert!(matches!(
        client.fetch_engine_status().await,
        Err(ControlError::Decode(_))
    ));
}

#[tokio::test]
async fn test_writes_use_expected_payloads() {
    let mock = MockControlPlane::default();
    let base = start_mock(mock.clone()).await;
    let client = ControlPlaneClient::new(format!("{base}/"), DEFAULT_TIMEOUT).unwrap();

    let id = Uuid::new_v4();
    client.send_command(EngineCommand::Start, id).await.unwrap();
    client.select_instrument("EURUSD").await.unwrap();
    client.set_replay_speed(2.5).await.unwrap();

    let writes = mock.writes.lock().clone();
    assert_eq!(writes.len(), 3);

    let (path, body) = &writes[0];
    assert_eq!(path, "command");
    assert_eq!(body["command"], "START");
    assert_eq!(body["command_id"], id.to_string());
    let last_updated = body["last_updated"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(last_updated).is_ok());

    assert_eq!(writes[1], ("select_asset".to_string(), json!({"asset": "EURUSD"})));
    assert_eq!(writes[2], ("set_replay_speed".to_string(), json!({"speed": 2.5})));
}

#[tokio::test]
async fn test_non_success_status_is_http_error() {
    let base = start_mock(MockControlPlane::default()).await;
    // No route for this path: axum answers 404.
    let client = ControlPlaneClient::new(format!("{base}/missing"), DEFAULT_TIMEOUT).unwrap();

    match client.select_instrument("EURUSD").await {
        Err(ControlError::Http { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_service_is_client_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = ControlPlaneClient::new(format!("http://{addr}"), DEFAULT_TIMEOUT).unwrap();

    assert!(matches!(
        client.fetch_engine_status().await,
        Err(ControlError::HttpClient(_))
    ));
}
