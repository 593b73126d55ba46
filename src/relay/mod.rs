//! MJPEG relay engine
//!
//! The engine fans one upstream multipart stream out to every connected
//! consumer and covers upstream outages with still frames.
//!
//! # Architecture
//!
//! ```text
//!   [UpstreamFetcher] ──UpstreamEvent──┐
//!                                      ▼
//!   [RelayHandle] ───Command──► RelayEngine task ◄── watchdog interval
//!                                ┌──────────────────┐
//!                                │ RelayState {     │
//!                                │   boundary,      │
//!                                │   consumers,     │
//!                                │   stall_counter, │
//!                                │   stills,        │
//!                                │ }                │
//!                                └────────┬─────────┘
//!                 ┌───────────────────────┼───────────────────────┐
//!                 ▼                       ▼                       ▼
//!            mpsc::Sender            mpsc::Sender            mpsc::Sender
//!                 │                       │                       │
//!        response body ──► TCP  response body ──► TCP  response body ──► TCP
//! ```
//!
//! Chunks are `bytes::Bytes`, so every consumer shares one allocation; a
//! joining consumer gets a zero-copy slice starting at the boundary.

pub mod config;
pub mod consumer;
pub mod engine;
pub mod state;

pub use config::RelayConfig;
pub use consumer::{Consumer, ConsumerId, ConsumerSink, SinkFailure, Subscription};
pub use engine::{RelayEngine, RelayHandle};
pub use state::{RelayState, TickOutcome};
