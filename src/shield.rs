//! HTTP control surface of the WiFi shield.
//!
//! The shield exposes a small plain-HTTP API: `DELETE /tcp` stops any
//! active stream, `GET /board` reports whether the sensor board is
//! attached, `POST /command` forwards single-character board commands,
//! and `POST /tcp` redirects the sample stream to a caller-supplied
//! TCP destination.
//!
//! [`ShieldControl`] is the seam for mock injection: the controller is
//! generic over it, the same way SCPI drivers swap a mock client in for
//! hardware during tests. [`MockShield`] lives here beside the real
//! client for exactly that purpose.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{DeviceEndpoint, StreamConfig, START_COMMAND};
use crate::error::{SessionError, SessionResult};

/// Per-request timeout for control operations.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of device-reported connectivity from the `/board` resource.
///
/// Read once, acted on, discarded. The fields beyond `board_connected`
/// are shield-reported metadata the controller passes through without
/// interpreting.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardStatus {
    /// Whether the sensor board is attached to the shield.
    pub board_connected: bool,
    /// Board model as reported by the shield, e.g. `"cyton"`.
    #[serde(default)]
    pub board_type: Option<String>,
    /// Channel count as reported by the shield.
    #[serde(default)]
    pub num_channels: Option<u8>,
    /// Per-channel gains as reported by the shield.
    #[serde(default)]
    pub gains: Option<Vec<u8>>,
}

/// Control operations against one shield endpoint.
#[async_trait]
pub trait ShieldControl: Send + Sync {
    /// Tear down any active stream. Idempotent: a shield with nothing
    /// to stop still counts as success.
    async fn stop_stream(&self) -> SessionResult<()>;

    /// Query board connectivity.
    async fn board_status(&self) -> SessionResult<BoardStatus>;

    /// Send the start-streaming command. Confirms acceptance only; the
    /// shield needs a settle delay before it actually produces samples.
    async fn start_acquisition(&self) -> SessionResult<()>;

    /// Ask the shield to redirect its sample stream to the destination
    /// in `config`. The listener there must already be bound.
    async fn request_stream(&self, config: &StreamConfig) -> SessionResult<()>;
}

#[async_trait]
impl<C: ShieldControl + ?Sized> ShieldControl for Arc<C> {
    async fn stop_stream(&self) -> SessionResult<()> {
        (**self).stop_stream().await
    }
    async fn board_status(&self) -> SessionResult<BoardStatus> {
        (**self).board_status().await
    }
    async fn start_acquisition(&self) -> SessionResult<()> {
        (**self).start_acquisition().await
    }
    async fn request_stream(&self, config: &StreamConfig) -> SessionResult<()> {
        (**self).request_stream(config).await
    }
}

// =============================================================================
// ShieldClient
// =============================================================================

/// HTTP client for a real shield.
pub struct ShieldClient {
    endpoint: DeviceEndpoint,
    client: Client,
}

impl ShieldClient {
    /// Create a client for the given endpoint.
    pub fn new(endpoint: DeviceEndpoint) -> SessionResult<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SessionError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { endpoint, client })
    }

    /// Endpoint this client talks to.
    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    fn unreachable(&self, source: reqwest::Error) -> SessionError {
        SessionError::DeviceUnreachable {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ShieldControl for ShieldClient {
    async fn stop_stream(&self) -> SessionResult<()> {
        let url = self.endpoint.url("tcp");
        debug!(%url, "stopping any active stream");

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        // Any response counts as stopped: the shield answers non-200
        // when there was no stream to stop.
        if !response.status().is_success() {
            debug!(status = %response.status(), "stop returned non-success, treating as stopped");
        }
        Ok(())
    }

    async fn board_status(&self) -> SessionResult<BoardStatus> {
        let url = self.endpoint.url("board");
        debug!(%url, "querying board status");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status: BoardStatus = response.json().await.map_err(|source| {
            SessionError::InvalidResponse {
                resource: "board",
                source,
            }
        })?;
        Ok(status)
    }

    async fn start_acquisition(&self) -> SessionResult<()> {
        let url = self.endpoint.url("command");
        info!(command = START_COMMAND, "sending start command");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "command": START_COMMAND }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::CommandRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn request_stream(&self, config: &StreamConfig) -> SessionResult<()> {
        let url = self.endpoint.url("tcp");
        info!(ip = %config.ip, port = config.port, "requesting stream redirect");
        debug!(?config, "redirect payload");

        let response = self
            .client
            .post(&url)
            .json(config)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        // The explicit status is the only success signal. An empty body
        // on its own proves nothing.
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, %body, "stream redirect rejected");
            return Err(SessionError::StreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("stream redirect accepted");
        Ok(())
    }
}

// =============================================================================
// MockShield
// =============================================================================

#[derive(Default)]
struct MockState {
    stop_calls: usize,
    command_calls: usize,
    stream_requests: Vec<StreamConfig>,
}

/// Mock shield for testing without hardware.
///
/// Records every control call and, when given a device payload, plays
/// the shield's side of the rendezvous: an accepted redirect spawns a
/// connection to the advertised destination, writes the payload, and
/// closes.
pub struct MockShield {
    board_connected: bool,
    rejection: Option<(u16, String)>,
    device_payload: Option<Vec<u8>>,
    state: Mutex<MockState>,
}

impl MockShield {
    /// Shield with a board attached.
    pub fn connected() -> Self {
        Self {
            board_connected: true,
            rejection: None,
            device_payload: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Shield reachable, but no board behind it.
    pub fn disconnected() -> Self {
        Self {
            board_connected: false,
            ..Self::connected()
        }
    }

    /// Refuse redirect requests with the given status and body.
    pub fn with_rejection(mut self, status: u16, body: impl Into<String>) -> Self {
        self.rejection = Some((status, body.into()));
        self
    }

    /// Bytes the simulated device sends after an accepted redirect.
    pub fn with_device_payload(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.device_payload = Some(bytes.into());
        self
    }

    /// How many times the stream resource was told to stop.
    pub async fn stop_calls(&self) -> usize {
        self.state.lock().await.stop_calls
    }

    /// How many times the start command was sent.
    pub async fn command_calls(&self) -> usize {
        self.state.lock().await.command_calls
    }

    /// Every redirect payload received, in order.
    pub async fn stream_requests(&self) -> Vec<StreamConfig> {
        self.state.lock().await.stream_requests.clone()
    }
}

#[async_trait]
impl ShieldControl for MockShield {
    async fn stop_stream(&self) -> SessionResult<()> {
        self.state.lock().await.stop_calls += 1;
        Ok(())
    }

    async fn board_status(&self) -> SessionResult<BoardStatus> {
        Ok(BoardStatus {
            board_connected: self.board_connected,
            board_type: Some("cyton".into()),
            num_channels: Some(8),
            gains: Some(vec![24; 8]),
        })
    }

    async fn start_acquisition(&self) -> SessionResult<()> {
        self.state.lock().await.command_calls += 1;
        Ok(())
    }

    async fn request_stream(&self, config: &StreamConfig) -> SessionResult<()> {
        self.state.lock().await.stream_requests.push(config.clone());

        if let Some((status, body)) = &self.rejection {
            return Err(SessionError::StreamRejected {
                status: *status,
                body: body.clone(),
            });
        }

        if let Some(payload) = &self.device_payload {
            let addr = format!("{}:{}", config.ip, config.port);
            let payload = payload.clone();
            tokio::spawn(async move {
                match tokio::net::TcpStream::connect(&addr).await {
                    Ok(mut stream) => {
                        let _ = stream.write_all(&payload).await;
                        let _ = stream.shutdown().await;
                    }
                    Err(e) => warn!(%addr, error = %e, "mock device failed to connect"),
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_stop_is_idempotent() {
        let shield = MockShield::connected();
        for _ in 0..3 {
            shield.stop_stream().await.unwrap();
        }
        assert_eq!(shield.stop_calls().await, 3);
    }

    #[tokio::test]
    async fn test_mock_reports_board_state() {
        let shield = MockShield::disconnected();
        let status = shield.board_status().await.unwrap();
        assert!(!status.board_connected);

        let shield = MockShield::connected();
        let status = shield.board_status().await.unwrap();
        assert!(status.board_connected);
        assert_eq!(status.board_type.as_deref(), Some("cyton"));
    }

    #[tokio::test]
    async fn test_mock_rejection_surfaces_status_and_body() {
        let shield = MockShield::connected().with_rejection(502, "Must connect to board");
        let config = crate::config::SessionConfig::new("127.0.0.1".parse().unwrap());
        let err = shield
            .request_stream(&config.stream_payload(3000))
            .await
            .unwrap_err();
        match err {
            SessionError::StreamRejected { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "Must connect to board");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_board_status_tolerates_minimal_payload() {
        let status: BoardStatus = serde_json::from_str(r#"{"board_connected": true}"#).unwrap();
        assert!(status.board_connected);
        assert!(status.board_type.is_none());
    }
}
