//! HTTP client for the control plane.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET  /api/engine/status`   -> `{"status": "ONLINE", "last_command_id": "..."}`
//! - `POST /api/engine/command`  <- `{"command": "START", "last_updated": "<RFC 3339>", "command_id": "..."}`
//! - `POST /api/select_asset`    <- `{"asset": "EURUSD"}`
//! - `POST /api/set_replay_speed`<- `{"speed": 2.0}`

use crate::error::{ControlError, ControlResult};
use chrono::Utc;
use cockpit_core::{EngineCommand, EngineStatus};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Local development address of the control plane.
pub const DEFAULT_CONTROL_URL: &str = "http://localhost:8000";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: EngineStatus,
    /// Id of the last command the engine carried out, when the service echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: EngineCommand,
    pub last_updated: String,
    pub command_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectAssetRequest {
    pub asset: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySpeedRequest {
    pub speed: f64,
}

/// Operations the synchronizer needs from the control plane.
pub trait ControlPlane: Send + Sync + 'static {
    fn fetch_engine_status(&self) -> impl Future<Output = ControlResult<StatusReport>> + Send;

    fn send_command(
        &self,
        command: EngineCommand,
        command_id: Uuid,
    ) -> impl Future<Output = ControlResult<()>> + Send;

    fn select_instrument(&self, asset: &str) -> impl Future<Output = ControlResult<()>> + Send;

    fn set_replay_speed(&self, speed: f64) -> impl Future<Output = ControlResult<()>> + Send;
}

/// reqwest-backed control-plane client.
pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ControlResult<()> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ControlError::HttpClient(format!("HTTP request failed: {e}")))?;

        ensure_success(response).await?;
        debug!(%url, "Control-plane write accepted");
        Ok(())
    }
}

async fn ensure_success(response: Response) -> ControlResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ControlError::Http {
        status: status.as_u16(),
        body,
    })
}

impl ControlPlane for ControlPlaneClient {
    async fn fetch_engine_status(&self) -> ControlResult<StatusReport> {
        let url = self.endpoint("/api/engine/status");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ControlError::HttpClient(format!("HTTP request failed: {e}")))?;

        let report: StatusReport = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ControlError::Decode(e.to_string()))?;

        debug!(status = %report.status, "Polled engine status");
        Ok(report)
    }

    async fn send_command(&self, command: EngineCommand, command_id: Uuid) -> ControlResult<()> {
        info!(%command, %command_id, "Sending engine command");
        let request = CommandRequest {
            command,
            last_updated: Utc::now().to_rfc3339(),
            command_id,
        };
        self.post_json("/api/engine/command", &request).await
    }

    async fn select_instrument(&self, asset: &str) -> ControlResult<()> {
        if asset.trim().is_empty() {
            return Err(ControlError::InvalidRequest("empty instrument symbol".to_string()));
        }
        info!(asset, "Selecting instrument");
        let request = SelectAssetRequest {
            asset: asset.to_string(),
        };
        self.post_json("/api/select_asset", &request).await
    }

    async fn set_replay_speed(&self, speed: f64) -> ControlResult<()> {
        if !speed.is_finite() {
            return Err(ControlError::InvalidRequest(format!(
                "replay speed must be a finite number, got {speed}"
            )));
        }
        info!(speed, "Setting replay speed");
        self.post_json("/api/set_replay_speed", &ReplaySpeedRequest { speed })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ControlPlaneClient::new("http://localhost:8000/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.endpoint("/api/select_asset"),
            "http://localhost:8000/api/select_asset"
        );
    }

    #[test]
    fn test_status_report_without_command_id() {
        let report: StatusReport = serde_json::from_str(r#"{"status":"ONLINE"}"#).unwrap();
        assert_eq!(report.status, EngineStatus::Online);
        assert!(report.last_command_id.is_none());
    }

    #[test]
    fn test_command_request_wire_format() {
        let id = Uuid::new_v4();
        let request = CommandRequest {
            command: EngineCommand::Stop,
            last_updated: "2026-10-19T12:00:00+00:00".to_string(),
            command_id: id,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["command"], "STOP");
        assert_eq!(json["last_updated"], "2026-10-19T12:00:00+00:00");
        assert_eq!(json["command_id"], id.to_string());
    }

    #[tokio::test]
    async fn test_invalid_writes_rejected_before_io() {
        let client = ControlPlaneClient::new("http://127.0.0.1:9", DEFAULT_TIMEOUT).unwrap();
        assert!(matches!(
            client.set_replay_speed(f64::NAN).await,
            Err(ControlError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.select_instrument("  ").await,
            Err(ControlError::InvalidRequest(_))
        ));
    }
}
