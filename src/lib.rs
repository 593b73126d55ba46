//! mjpeg-relay: MJPEG stream relay with stall failover
//!
//! This library relays a single upstream Motion-JPEG stream
//! (`multipart/x-mixed-replace`) to any number of HTTP viewers:
//! - One upstream request, fanned out to every viewer without re-fetching
//! - Viewers joining mid-frame start at the next part boundary
//! - Stall detection with automatic upstream reconnect
//! - Rotating still frames served while the upstream is down
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_relay::{RelayConfig, RelayEngine, RelayServer, ServerConfig, UpstreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let upstream = UpstreamConfig::new("http://camera.local:8081/?action=stream");
//!     let relay = RelayEngine::spawn(RelayConfig::default(), upstream, Vec::new())?;
//!
//!     let server = RelayServer::bind(ServerConfig::default(), relay).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod multipart;
pub mod relay;
pub mod server;
pub mod stats;
pub mod upstream;

// Re-export main types for convenience
pub use error::{ConfigError, Error, Result};
pub use relay::{RelayConfig, RelayEngine, RelayHandle, Subscription};
pub use server::{RelayServer, ServerConfig};
pub use stats::RelayStats;
pub use upstream::UpstreamConfig;
