//! Upstream MJPEG source
//!
//! Holds the one outbound streaming request to the camera. The fetcher is
//! plain plumbing: it reports headers, body chunks and failures to the
//! engine as [`UpstreamEvent`]s and never retries on its own.

pub mod config;
pub mod fetcher;

pub use config::UpstreamConfig;
pub use fetcher::{UpstreamEvent, UpstreamEventKind, UpstreamFetcher, UpstreamPhase};
