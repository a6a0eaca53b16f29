//! Single-shot capture harness for the OpenBCI WiFi Shield.
//!
//! Runs one acquisition session and writes the raw capture to a file.
//! Ctrl-c during the capture window cancels it and still sends the
//! shield its stop.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use openbci_session::{
    AcquisitionSink, DeviceEndpoint, FileSink, OutputFormat, SessionConfig, SessionController,
    ShieldClient, DEFAULT_DATA_PORT, DEFAULT_LATENCY_US,
};

#[derive(Parser, Debug)]
#[command(name = "openbci-session")]
#[command(about = "Run one streaming session against an OpenBCI WiFi Shield", long_about = None)]
struct Args {
    /// Shield IP address
    #[arg(short, long, default_value = "192.168.4.1")]
    shield_ip: String,

    /// Local IP the shield should stream to
    #[arg(short, long, default_value = "192.168.4.2")]
    local_ip: IpAddr,

    /// Local TCP data port
    #[arg(short, long, default_value_t = DEFAULT_DATA_PORT)]
    port: u16,

    /// Sample encoding requested from the shield
    #[arg(long, value_enum, default_value = "json")]
    output: OutputFormat,

    /// Inter-packet latency budget in microseconds
    #[arg(long, default_value_t = DEFAULT_LATENCY_US)]
    latency: u32,

    /// Capture window in seconds
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// File the raw capture is written to
    #[arg(short = 'o', long, default_value = "capture.bin")]
    out: PathBuf,

    /// TOML session config; overrides the flags above when given
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    async fn session_config(&self) -> anyhow::Result<SessionConfig> {
        if let Some(path) = &self.config {
            return SessionConfig::load(path)
                .await
                .with_context(|| format!("loading config from {}", path.display()));
        }

        let mut config = SessionConfig::new(self.local_ip);
        config.local_port = self.port;
        config.output = self.output;
        config.latency_us = self.latency;
        config.capture_timeout = Duration::from_secs(self.duration);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.session_config().await?;
    let endpoint = DeviceEndpoint::with_default_port(args.shield_ip.clone());

    info!(shield = %endpoint, local = %config.local_ip, port = config.local_port, "starting session");

    let shield = ShieldClient::new(endpoint)?;
    let mut controller = SessionController::new(shield, config);

    let result = {
        let run = controller.run();
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    let capture = match result {
        Some(result) => result?,
        None => {
            // Cancelled mid-capture; the socket is already closed, the
            // shield still needs its stop.
            warn!("interrupted, stopping stream");
            controller.abort().await;
            anyhow::bail!("session interrupted");
        }
    };

    info!(
        bytes = capture.len(),
        outcome = ?capture.outcome(),
        elapsed = ?capture.elapsed(),
        "session complete"
    );
    if capture.is_empty() {
        warn!("no data arrived during the capture window");
    }

    let mut sink = FileSink::new(&args.out);
    sink.persist(&capture).await?;

    Ok(())
}
