//! MJPEG relay server
//!
//! Run with:
//!   mjpeg-relay --upstream http://camera.local:8081/?action=stream \
//!       --still offline.jpg --still reconnecting.jpg
//!
//! Then point viewers (browsers, VLC, ffplay) at http://localhost:8080/.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;

use mjpeg_relay::{
    ConfigError, RelayConfig, RelayEngine, RelayServer, ServerConfig, UpstreamConfig,
};

#[derive(Parser)]
#[command(
    name = "mjpeg-relay",
    about = "Relay one MJPEG camera stream to many HTTP viewers"
)]
struct Args {
    /// Source MJPEG URL
    #[arg(long, short, env = "MJPEG_RELAY_UPSTREAM")]
    upstream: Option<String>,

    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// JPEG served while the upstream is down (repeat to rotate several)
    #[arg(long = "still", value_name = "PATH")]
    stills: Vec<PathBuf>,

    /// Watchdog tick interval in milliseconds
    #[arg(long, default_value_t = 240)]
    tick_interval_ms: u64,

    /// Restart the upstream after this long without a frame boundary
    #[arg(long, default_value_t = 1000)]
    stall_timeout_ms: u64,

    /// Minimum time between upstream restarts
    #[arg(long, default_value_t = 10_000)]
    restart_cooldown_ms: u64,

    /// Maximum concurrent viewers (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,
}

async fn load_stills(paths: &[PathBuf]) -> std::io::Result<Vec<Bytes>> {
    let mut stills = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path).await.map_err(|e| {
            std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), bytes = data.len(), "Loaded still frame");
        stills.push(Bytes::from(data));
    }
    Ok(stills)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_relay=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let url = args.upstream.ok_or(ConfigError::MissingUpstreamUrl)?;
    let upstream = UpstreamConfig::new(url);

    let relay_config = RelayConfig::default()
        .tick_interval(Duration::from_millis(args.tick_interval_ms))
        .stall_timeout(Duration::from_millis(args.stall_timeout_ms))
        .restart_cooldown(Duration::from_millis(args.restart_cooldown_ms));

    let server_config = ServerConfig::with_addr(args.bind).max_connections(args.max_connections);

    let stills = load_stills(&args.stills).await?;
    if stills.is_empty() {
        tracing::warn!("No still frames configured; outages will produce empty parts");
    }

    let relay = RelayEngine::spawn(relay_config, upstream, stills)?;
    let server = RelayServer::bind(server_config, relay.clone()).await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    relay.shutdown().await?;
    Ok(())
}
