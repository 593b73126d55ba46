//! Statistics for the relay

pub mod metrics;

pub use metrics::{RelayCounters, RelayStats};
