//! Session lifecycle against one shield endpoint.
//!
//! A session walks a fixed sequence with verification at each step:
//!
//! 1. stop any prior stream (clean baseline, idempotent)
//! 2. verify the sensor board is attached
//! 3. send the start command, then wait the settle delay
//! 4. bind the local ingress listener
//! 5. request the stream redirect
//! 6. capture until remote close or the hard timeout
//! 7. stop the stream — on every exit path
//!
//! Step 7 is the one unconditional guarantee: whatever failed earlier,
//! the shield is told to stop before the error reaches the caller.
//! The shield is single-stream, so exactly one session runs per
//! endpoint at a time; a new run always begins by stopping whatever a
//! previous process may have left behind.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::ingress::{Capture, IngressListener};
use crate::shield::ShieldControl;

/// Observable lifecycle state of a session.
///
/// Advances only `Idle → StreamRequested → Streaming → Stopped`; any
/// failure moves to `Failed` and nothing transitions out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No stream requested yet.
    Idle,
    /// Listener bound, redirect request in flight.
    StreamRequested,
    /// Redirect accepted, capture window open.
    Streaming,
    /// Session finished and teardown ran.
    Stopped,
    /// A step failed; the reason is the surfaced error's message.
    Failed(String),
}

/// Drives one [`DeviceEndpoint`](crate::config::DeviceEndpoint) through
/// a safe start/stop sequence for data capture.
pub struct SessionController<C> {
    shield: C,
    config: SessionConfig,
    state: SessionState,
}

impl<C: ShieldControl> SessionController<C> {
    /// Controller for one session. `shield` is typically a
    /// [`ShieldClient`](crate::shield::ShieldClient); tests inject a
    /// [`MockShield`](crate::shield::MockShield).
    pub fn new(shield: C, config: SessionConfig) -> Self {
        Self {
            shield,
            config,
            state: SessionState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the full handshake and capture.
    ///
    /// Teardown is issued on every exit path, success or failure. The
    /// returned [`Capture`] is frozen: bytes, outcome, and elapsed time
    /// for the window. An empty capture is a valid result, not an
    /// error.
    pub async fn run(&mut self) -> SessionResult<Capture> {
        // One controller, one session: state never leaves Stopped or
        // Failed, so a finished controller refuses to run again.
        if self.state != SessionState::Idle {
            return Err(SessionError::SessionConsumed);
        }

        let result = self.drive().await;

        // Cleanup guarantee: the shield is told to stop no matter how
        // the handshake ended. A failed stop must not mask the
        // original error.
        if let Err(stop_err) = self.shield.stop_stream().await {
            warn!(error = %stop_err, "teardown stop failed");
        }

        match result {
            Ok(capture) => {
                self.state = SessionState::Stopped;
                Ok(capture)
            }
            Err(err) => {
                self.state = SessionState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Run the session and hand the frozen capture to `sink`.
    pub async fn run_into(
        &mut self,
        sink: &mut dyn AcquisitionSink,
    ) -> SessionResult<Capture> {
        let capture = self.run().await?;
        sink.persist(&capture).await?;
        Ok(capture)
    }

    /// Interrupt cleanup: send the stop teardown without a capture.
    ///
    /// For callers that cancelled the `run` future mid-capture and
    /// still owe the device its stop.
    pub async fn abort(&mut self) {
        if let Err(err) = self.shield.stop_stream().await {
            warn!(error = %err, "teardown stop failed");
        }
        self.state = SessionState::Failed("interrupted".into());
    }

    async fn drive(&mut self) -> SessionResult<Capture> {
        // Clean baseline regardless of what a previous process left
        // running on the shield.
        self.shield.stop_stream().await?;

        let status = self.shield.board_status().await?;
        if !status.board_connected {
            return Err(SessionError::BoardNotConnected);
        }
        info!(
            board_type = status.board_type.as_deref(),
            channels = status.num_channels,
            "board connected"
        );

        // Advisory only: the board can still detach between here and
        // the capture, which then shows up as an empty window.
        self.shield.start_acquisition().await?;
        tokio::time::sleep(self.config.settle_delay).await;

        // Bind before the redirect. The shield connects out exactly
        // once and does not retry a refused connection.
        let listener = IngressListener::bind(self.config.bind_addr()).await?;
        let payload = self.config.stream_payload(listener.local_addr().port());
        self.state = SessionState::StreamRequested;

        if let Err(err) = self.shield.request_stream(&payload).await {
            // No connection will ever arrive now; release the port
            // before surfacing the rejection.
            listener.close();
            return Err(err);
        }
        self.state = SessionState::Streaming;

        let capture = listener.capture(self.config.capture_timeout).await?;
        if capture.is_empty() {
            warn!("capture window closed with no data");
        }
        Ok(capture)
    }
}

// =============================================================================
// AcquisitionSink
// =============================================================================

/// Where a frozen capture goes once the session is over.
///
/// The controller exposes raw bytes and does not decide storage
/// location or format; that is the sink's concern.
#[async_trait]
pub trait AcquisitionSink: Send {
    /// Persist one capture.
    async fn persist(&mut self, capture: &Capture) -> SessionResult<()>;
}

/// Writes the raw capture bytes to one file per session.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Sink writing to the given path, overwriting any previous file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AcquisitionSink for FileSink {
    async fn persist(&mut self, capture: &Capture) -> SessionResult<()> {
        tokio::fs::write(&self.path, capture.bytes()).await?;
        info!(path = %self.path.display(), bytes = capture.len(), "capture written");
        Ok(())
    }
}
