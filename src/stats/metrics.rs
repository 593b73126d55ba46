//! Relay counters and snapshots

use crate::upstream::UpstreamPhase;

/// Running counters kept by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayCounters {
    /// Upstream chunks forwarded to at least the fan-out loop
    pub chunks_relayed: u64,
    /// Bytes of upstream data seen while on air
    pub bytes_relayed: u64,
    /// Still-frame parts injected
    pub still_frames_injected: u64,
    /// Upstream restarts triggered by the watchdog
    pub upstream_restarts: u64,
    /// Consumers dropped because their queue was full or closed
    pub consumers_evicted: u64,
}

/// Point-in-time view of the relay
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Connected consumers
    pub consumers: usize,
    /// Consumers that joined at a boundary
    pub live_consumers: usize,
    /// Current boundary token
    pub boundary: String,
    /// Whether live frames are being relayed
    pub on_air: bool,
    /// Stall counter, negative during the restart cooldown
    pub stall_counter: i64,
    /// State of the upstream connection
    pub upstream_phase: UpstreamPhase,
    /// Running counters
    pub counters: RelayCounters,
}
