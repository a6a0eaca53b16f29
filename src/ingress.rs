//! Local TCP ingress for the redirected sample stream.
//!
//! The shield pushes data by connecting out to a caller-supplied
//! destination exactly once, with no retry on refusal. The listener
//! therefore has to be bound and accepting before the redirect request
//! goes out; [`IngressListener::bind`] and the controller's ordering
//! enforce that rendezvous.
//!
//! A capture is single-shot and bounded: one connection, one window,
//! then the socket closes. Partial or empty data is an outcome, not an
//! error.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};

const READ_CHUNK_BYTES: usize = 8192;

/// How a capture window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The shield closed the connection before the deadline.
    RemoteClosed,
    /// The hard timeout elapsed; whatever arrived is the result.
    TimedOut,
    /// The deadline passed before any connection arrived.
    NoConnection,
}

/// Frozen bytes from one capture window.
///
/// Built by exactly one writer (the accept/read loop) and handed out
/// only after the window has closed; nothing mutates it afterwards.
#[derive(Debug)]
pub struct Capture {
    bytes: Vec<u8>,
    outcome: CaptureOutcome,
    elapsed: Duration,
}

impl Capture {
    /// Raw bytes received, in arrival order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the capture, keeping only the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// How the window ended.
    pub fn outcome(&self) -> CaptureOutcome {
        self.outcome
    }

    /// Wall-clock duration of the window.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of bytes received.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing arrived. Distinguishable from a transport error:
    /// an empty capture is still `Ok`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bound TCP listener awaiting the shield's single inbound connection.
#[derive(Debug)]
pub struct IngressListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl IngressListener {
    /// Bind the ingress socket.
    ///
    /// Must happen before the redirect request is sent; the shield
    /// connects out once and a refused connection is not retried.
    pub async fn bind(addr: SocketAddr) -> SessionResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SessionError::PortUnavailable { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "ingress listener bound");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener actually bound, with any ephemeral port
    /// resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run one capture window.
    ///
    /// Accepts at most one connection and reads until the peer closes
    /// or `window` elapses, whichever comes first. Dropping the
    /// returned future (e.g. on process interrupt) closes the socket;
    /// the caller still owes the device a stop.
    pub async fn capture(self, window: Duration) -> SessionResult<Capture> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + window;
        let mut bytes = Vec::new();

        let mut stream = match timeout_at(deadline, self.listener.accept()).await {
            Err(_) => {
                warn!(window = ?window, "no connection before capture deadline");
                return Ok(Capture {
                    bytes,
                    outcome: CaptureOutcome::NoConnection,
                    elapsed: started.elapsed(),
                });
            }
            Ok(Err(e)) => return Err(SessionError::Io(e)),
            Ok(Ok((stream, peer))) => {
                info!(%peer, "shield connected");
                stream
            }
        };

        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let outcome = loop {
            match timeout_at(deadline, stream.read(&mut chunk)).await {
                Err(_) => break CaptureOutcome::TimedOut,
                Ok(Ok(0)) => break CaptureOutcome::RemoteClosed,
                Ok(Ok(n)) => {
                    bytes.extend_from_slice(&chunk[..n]);
                    debug!(n, total = bytes.len(), "chunk received");
                }
                Ok(Err(e)) => return Err(SessionError::Io(e)),
            }
        };

        let elapsed = started.elapsed();
        info!(bytes = bytes.len(), ?outcome, ?elapsed, "capture window closed");
        Ok(Capture {
            bytes,
            outcome,
            elapsed,
        })
    }

    /// Close without capturing. Used when the redirect was refused and
    /// no connection will ever arrive.
    pub fn close(self) {
        debug!(addr = %self.local_addr, "closing ingress listener unused");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn bind_local() -> IngressListener {
        IngressListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_capture_without_connection_is_empty_not_error() {
        let listener = bind_local().await;
        let capture = listener.capture(Duration::from_millis(100)).await.unwrap();
        assert!(capture.is_empty());
        assert_eq!(capture.outcome(), CaptureOutcome::NoConnection);
        assert!(capture.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_capture_returns_bytes_until_remote_close() {
        let listener = bind_local().await;
        let addr = listener.local_addr();

        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"{\"chunk\":[]}\n").await.unwrap();
            stream.write_all(b"{\"chunk\":[]}\n").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let capture = listener.capture(Duration::from_secs(2)).await.unwrap();
        assert_eq!(capture.bytes(), b"{\"chunk\":[]}\n{\"chunk\":[]}\n");
        assert_eq!(capture.outcome(), CaptureOutcome::RemoteClosed);
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_data() {
        let listener = bind_local().await;
        let addr = listener.local_addr();

        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"partial").await.unwrap();
            // Hold the connection open past the window.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let capture = listener.capture(Duration::from_millis(300)).await.unwrap();
        assert_eq!(capture.bytes(), b"partial");
        assert_eq!(capture.outcome(), CaptureOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_port_unavailable() {
        let listener = bind_local().await;
        let addr = listener.local_addr();

        let err = IngressListener::bind(addr).await.unwrap_err();
        match err {
            SessionError::PortUnavailable { addr: reported, .. } => {
                assert_eq!(reported, addr);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_close_releases_port() {
        let listener = bind_local().await;
        let addr = listener.local_addr();
        listener.close();

        IngressListener::bind(addr).await.unwrap();
    }
}
