//! Error types for shield sessions.
//!
//! `SessionError` covers every failure the controller can surface. Two
//! conditions that look like errors are deliberately absent: a capture
//! window that times out and a capture that receives nothing are normal
//! terminal states for a short session, and are reported through
//! [`CaptureOutcome`](crate::ingress::CaptureOutcome) instead.
//!
//! No operation here retries. A failed session is rerun whole by the
//! operator; the one guarantee the controller gives is that teardown
//! still runs on every failure path.

use std::net::SocketAddr;

use thiserror::Error;

/// Convenience alias for results using the session error type.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Primary error type for shield control and capture operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No response from the shield's control interface at all.
    ///
    /// Distinct from [`SessionError::BoardNotConnected`]: the shield is a
    /// network bridge, and it can be reachable while the sensor board
    /// behind it is unplugged.
    #[error("shield at {endpoint} unreachable: {source}")]
    DeviceUnreachable {
        /// Control endpoint that failed to answer.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The shield answered but reports no sensor board attached.
    ///
    /// Fatal for the session: starting a stream with no board produces
    /// nothing, so the controller refuses to proceed past this.
    #[error("shield reachable but sensor board not connected")]
    BoardNotConnected,

    /// Binding the local ingress listener failed.
    ///
    /// Usually the port is already taken by a previous run that did not
    /// shut down cleanly.
    #[error("cannot bind ingress listener on {addr}: {source}")]
    PortUnavailable {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying bind error.
        #[source]
        source: std::io::Error,
    },

    /// The shield refused the start command.
    #[error("start command rejected with status {status}: {body}")]
    CommandRejected {
        /// HTTP status returned by the `/command` resource.
        status: u16,
        /// Response body, echoed for diagnostics.
        body: String,
    },

    /// The shield refused the stream-redirect request.
    ///
    /// Only an explicit success status counts as acceptance; an empty or
    /// missing body is not inspected to infer anything.
    #[error("stream redirect rejected with status {status}: {body}")]
    StreamRejected {
        /// HTTP status returned by the `/tcp` resource.
        status: u16,
        /// Response body, echoed for diagnostics.
        body: String,
    },

    /// The shield answered with a payload the client could not decode.
    #[error("unexpected response from shield /{resource} resource: {source}")]
    InvalidResponse {
        /// Control resource that produced the payload.
        resource: &'static str,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// `run` was called on a controller that already finished.
    ///
    /// Session state never leaves `Stopped` or `Failed`; a new attempt
    /// needs a new controller.
    #[error("session controller already used; create a new controller to retry")]
    SessionConsumed,

    /// Configuration could not be loaded or was semantically invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure on the local ingress socket or the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_not_connected_display() {
        let err = SessionError::BoardNotConnected;
        assert_eq!(
            err.to_string(),
            "shield reachable but sensor board not connected"
        );
    }

    #[test]
    fn test_stream_rejected_carries_diagnostics() {
        let err = SessionError::StreamRejected {
            status: 502,
            body: "Must connect to board".into(),
        };
        let text = err.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("Must connect to board"));
    }

    #[test]
    fn test_port_unavailable_names_address() {
        let err = SessionError::PortUnavailable {
            addr: "0.0.0.0:3000".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().contains("0.0.0.0:3000"));
    }
}
