//! Mock control plane for integration tests.
//!
//! Reports a fixed engine status, applies commands to it immediately and
//! echoes the last command id, like the real backend does.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Default)]
struct Inner {
    status: String,
    last_command_id: Option<String>,
    writes: Vec<(String, Value)>,
}

#[derive(Clone)]
pub struct MockControlPlane {
    inner: Arc<Mutex<Inner>>,
    url: String,
}

impl MockControlPlane {
    pub async fn start(status: &str) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            status: status.to_string(),
            ..Inner::default()
        }));

        let app = Router::new()
            .route("/api/engine/status", get(get_status))
            .route("/api/engine/command", post(post_command))
            .route("/api/select_asset", post(post_select_asset))
            .route("/api/set_replay_speed", post(post_replay_speed))
            .with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            inner,
            url: format!("http://{addr}"),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Writes received so far, as `(endpoint, body)`.
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.inner.lock().writes.clone()
    }
}

type Shared = State<Arc<Mutex<Inner>>>;

async fn get_status(State(inner): Shared) -> Json<Value> {
    let inner = inner.lock();
    Json(json!({"status": inner.status, "last_command_id": inner.last_command_id}))
}

async fn post_command(State(inner): Shared, Json(body): Json<Value>) -> StatusCode {
    let mut inner = inner.lock();
    inner.status = match body["command"].as_str() {
        Some("START") => "ONLINE".to_string(),
        _ => "OFFLINE".to_string(),
    };
    inner.last_command_id = body["command_id"].as_str().map(str::to_string);
    inner.writes.push(("command".to_string(), body));
    StatusCode::OK
}

async fn post_select_asset(State(inner): Shared, Json(body): Json<Value>) -> StatusCode {
    inner.lock().writes.push(("select_asset".to_string(), body));
    StatusCode::OK
}

async fn post_replay_speed(State(inner): Shared, Json(body): Json<Value>) -> StatusCode {
    inner.lock().writes.push(("set_replay_speed".to_string(), body));
    StatusCode::OK
}
