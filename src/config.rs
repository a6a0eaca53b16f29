//! Endpoint addressing and session configuration.
//!
//! All timing assumptions of the handshake live here as named constants
//! rather than implicit sleeps, so tests can shrink them and operators
//! can override them from a TOML file or the CLI.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// HTTP control port of the WiFi shield.
pub const DEFAULT_CONTROL_PORT: u16 = 80;

/// Local TCP port the shield streams sample data to.
pub const DEFAULT_DATA_PORT: u16 = 3000;

/// Default inter-packet latency budget requested from the shield, in
/// microseconds.
pub const DEFAULT_LATENCY_US: u32 = 10_000;

/// Wait after the start command before requesting the redirect.
///
/// The shield needs time to begin producing samples internally; this is
/// a fixed design parameter of the device, not a negotiated handshake.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Hard ceiling on one capture window. The listener closes when it
/// elapses regardless of how much data has arrived.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cyton start-streaming command (single ASCII character protocol).
pub const START_COMMAND: &str = "b";

// =============================================================================
// DeviceEndpoint
// =============================================================================

/// Network address of the shield's control interface.
///
/// Immutable for the lifetime of a session; every operation takes it
/// explicitly instead of reading ambient configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    host: String,
    port: u16,
}

impl DeviceEndpoint {
    /// Create an endpoint with an explicit control port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create an endpoint on the standard control port (80).
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_CONTROL_PORT)
    }

    /// Hostname or IP address of the shield.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// URL of a control resource, e.g. `url("tcp")`.
    pub fn url(&self, resource: &str) -> String {
        format!("http://{}/{}", self, resource)
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_CONTROL_PORT {
            write!(f, "{}", self.host)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Configuration for one streaming session.
///
/// Constructed once per session. The wire-facing subset is sent verbatim
/// to the shield's `/tcp` resource as [`StreamConfig`]; the timing
/// fields govern the controller itself.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Local IP the shield is told to stream to. Must be routable from
    /// the shield's side of the network.
    pub local_ip: IpAddr,

    /// Address the ingress listener actually binds. Defaults to
    /// `0.0.0.0` so the advertised IP need not match an interface name.
    #[serde(default = "default_bind_ip")]
    pub bind_ip: IpAddr,

    /// Local TCP data port (default: 3000). Port 0 binds an ephemeral
    /// port; the resolved port is what gets advertised to the shield.
    #[serde(default = "default_data_port")]
    pub local_port: u16,

    /// Requested sample encoding.
    #[serde(default)]
    pub output: OutputFormat,

    /// Ask the shield to newline-delimit packets.
    #[serde(default = "default_true")]
    pub delimiter: bool,

    /// Inter-packet latency budget in microseconds.
    #[serde(default = "default_latency")]
    pub latency_us: u32,

    /// Burst transmission mode.
    #[serde(default)]
    pub burst: bool,

    /// Wait between the start command and the redirect request.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Hard capture window ceiling.
    #[serde(default = "default_capture_timeout", with = "humantime_serde")]
    pub capture_timeout: Duration,
}

fn default_bind_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_data_port() -> u16 {
    DEFAULT_DATA_PORT
}

fn default_true() -> bool {
    true
}

fn default_latency() -> u32 {
    DEFAULT_LATENCY_US
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

fn default_capture_timeout() -> Duration {
    DEFAULT_CAPTURE_TIMEOUT
}

impl SessionConfig {
    /// Configuration with default timings for the given advertised IP.
    pub fn new(local_ip: IpAddr) -> Self {
        Self {
            local_ip,
            bind_ip: default_bind_ip(),
            local_port: DEFAULT_DATA_PORT,
            output: OutputFormat::default(),
            delimiter: true,
            latency_us: DEFAULT_LATENCY_US,
            burst: false,
            settle_delay: DEFAULT_SETTLE_DELAY,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }

    /// Load a session configuration from a TOML file.
    pub async fn load(path: &Path) -> SessionResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        toml::from_str(&text)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Address the ingress listener binds.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.local_port)
    }

    /// Wire payload for the `/tcp` redirect request.
    ///
    /// `advertised_port` is the port the listener actually bound, which
    /// differs from `local_port` when an ephemeral port was requested.
    pub fn stream_payload(&self, advertised_port: u16) -> StreamConfig {
        StreamConfig {
            ip: self.local_ip.to_string(),
            port: advertised_port,
            output: self.output,
            delimiter: self.delimiter,
            latency: self.latency_us,
            burst: self.burst,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Sample encoding the shield is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Newline-delimited JSON chunks.
    #[default]
    Json,
    /// Raw binary packets.
    Raw,
}

/// Payload shape of the shield's `/tcp` stream-redirect resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    /// Destination IP for the redirected stream.
    pub ip: String,
    /// Destination TCP port.
    pub port: u16,
    /// Sample encoding.
    pub output: OutputFormat,
    /// Newline-delimit packets.
    pub delimiter: bool,
    /// Microseconds between packets.
    pub latency: u32,
    /// Burst transmission mode.
    pub burst: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_omits_default_port() {
        let endpoint = DeviceEndpoint::with_default_port("192.168.4.1");
        assert_eq!(endpoint.url("tcp"), "http://192.168.4.1/tcp");

        let endpoint = DeviceEndpoint::new("192.168.4.1", 8080);
        assert_eq!(endpoint.url("board"), "http://192.168.4.1:8080/board");
    }

    #[test]
    fn test_stream_payload_shape() {
        let config = SessionConfig::new("10.0.0.5".parse().unwrap());
        let payload = serde_json::to_value(config.stream_payload(3000)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "ip": "10.0.0.5",
                "port": 3000,
                "output": "json",
                "delimiter": true,
                "latency": 10000,
                "burst": false
            })
        );
    }

    #[test]
    fn test_payload_uses_advertised_port_not_configured_port() {
        let mut config = SessionConfig::new("10.0.0.5".parse().unwrap());
        config.local_port = 0;
        assert_eq!(config.stream_payload(49152).port, 49152);
    }

    #[tokio::test]
    async fn test_load_reads_file_without_blocking_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        tokio::fs::write(
            &path,
            "local_ip = \"192.168.4.2\"\ncapture_timeout = \"5s\"\n",
        )
        .await
        .unwrap();

        let config = SessionConfig::load(&path).await.unwrap();
        assert_eq!(config.local_ip.to_string(), "192.168.4.2");
        assert_eq!(config.capture_timeout, Duration::from_secs(5));

        let err = SessionConfig::load(&dir.path().join("missing.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::SessionError::Io(_)));
    }

    #[test]
    fn test_toml_defaults_and_overrides() {
        let config: SessionConfig = toml::from_str(
            r#"
            local_ip = "192.168.4.2"
            latency_us = 4000
            settle_delay = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.local_ip.to_string(), "192.168.4.2");
        assert_eq!(config.local_port, DEFAULT_DATA_PORT);
        assert_eq!(config.latency_us, 4000);
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.capture_timeout, DEFAULT_CAPTURE_TIMEOUT);
        assert!(config.delimiter);
        assert!(!config.burst);
    }
}
