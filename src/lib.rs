//! Acquisition session controller for the OpenBCI WiFi Shield.
//!
//! The shield bridges a Cyton sensor board to the network: a small HTTP
//! API controls it, and sample data arrives over a TCP stream the
//! shield pushes to a caller-supplied destination. This crate owns the
//! lifecycle of one such streaming session:
//!
//! 1. Stop any prior stream (idempotent, clean baseline)
//! 2. Verify the sensor board is attached
//! 3. Send the start command and wait a settle delay
//! 4. Bind the local ingress listener
//! 5. Request stream redirection to that listener
//! 6. Capture bytes until remote close or a hard timeout
//! 7. Tear down — on every path, including failures and interrupts
//!
//! # Example
//!
//! ```rust,ignore
//! use openbci_session::{
//!     DeviceEndpoint, SessionConfig, SessionController, ShieldClient,
//! };
//!
//! let endpoint = DeviceEndpoint::with_default_port("192.168.4.1");
//! let config = SessionConfig::new("192.168.4.2".parse()?);
//! let mut controller = SessionController::new(ShieldClient::new(endpoint)?, config);
//!
//! let capture = controller.run().await?;
//! println!("{} bytes, outcome {:?}", capture.len(), capture.outcome());
//! ```
//!
//! # Mock Mode
//!
//! The controller is generic over [`ShieldControl`]; tests inject
//! [`MockShield`] in place of the HTTP client and drive full sessions
//! against a simulated device with no hardware present.
//!
//! # Timing
//!
//! The handshake's two timing assumptions — the settle delay after the
//! start command and the hard capture timeout — are explicit fields of
//! [`SessionConfig`] with named defaults, not implicit sleeps.

pub mod config;
pub mod error;
pub mod ingress;
pub mod session;
pub mod shield;

pub use config::{
    DeviceEndpoint, OutputFormat, SessionConfig, StreamConfig, DEFAULT_CAPTURE_TIMEOUT,
    DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, DEFAULT_LATENCY_US, DEFAULT_SETTLE_DELAY,
    START_COMMAND,
};
pub use error::{SessionError, SessionResult};
pub use ingress::{Capture, CaptureOutcome, IngressListener};
pub use session::{AcquisitionSink, FileSink, SessionController, SessionState};
pub use shield::{BoardStatus, MockShield, ShieldClient, ShieldControl};
