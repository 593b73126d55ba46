//! Relay state machine
//!
//! All relay decisions live here, free of I/O and timers so they can be
//! driven deterministically. The engine task feeds it upstream chunks and
//! watchdog ticks and acts on the returned [`TickOutcome`].
//!
//! ```text
//!            boundary seen (counter = 0)
//!      ┌───────────────────────────────────────┐
//!      ▼                                       │
//!   [LIVE] ── counter > stall_ticks ──► [STALLED / INJECTING]
//!   relay chunks                        restart upstream,
//!                                       counter = -cooldown,
//!                                       still frame every tick
//! ```

use bytes::Bytes;

use crate::multipart::{find_boundary, still_frame_part};
use crate::stats::RelayCounters;

use super::config::RelayConfig;
use super::consumer::{Consumer, ConsumerId, ConsumerSink, SinkFailure};

/// What the caller must do after a watchdog tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Tear down the upstream connection and start a new one
    pub restart_upstream: bool,
    /// A still frame was broadcast on this tick
    pub injected_still: bool,
}

/// Broadcaster and watchdog state for one upstream
pub struct RelayState {
    /// Current boundary token
    boundary: String,

    /// Still images served during failover
    stills: Vec<Bytes>,

    /// Next still image to serve
    still_index: usize,

    /// Connected consumers, in join order
    consumers: Vec<Consumer>,

    /// Ticks since the last boundary marker (negative during cooldown)
    stall_counter: i64,

    /// Whether live chunks are relayed
    on_air: bool,

    /// Restart once the counter exceeds this
    stall_ticks: i64,

    /// Counter value after a restart is `-cooldown_ticks`
    cooldown_ticks: i64,

    counters: RelayCounters,
}

impl RelayState {
    /// Create a new relay state
    ///
    /// The counter starts in cooldown, the same position as right after a
    /// restart, because the engine opens the upstream at startup.
    pub fn new(config: &RelayConfig, stills: Vec<Bytes>) -> Self {
        let cooldown_ticks = config.cooldown_ticks();

        Self {
            boundary: config.default_boundary.clone(),
            stills,
            still_index: 0,
            consumers: Vec::new(),
            stall_counter: -cooldown_ticks,
            on_air: true,
            stall_ticks: config.stall_ticks(),
            cooldown_ticks,
            counters: RelayCounters::default(),
        }
    }

    /// Get the current boundary token
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Replace the boundary token after an upstream (re)connect
    pub fn set_boundary(&mut self, boundary: String) {
        if boundary != self.boundary {
            tracing::debug!(old = %self.boundary, new = %boundary, "Boundary changed");
        }
        self.boundary = boundary;
    }

    /// Check if live chunks are relayed
    pub fn on_air(&self) -> bool {
        self.on_air
    }

    /// Enable or suppress live relay
    pub fn set_on_air(&mut self, on_air: bool) {
        self.on_air = on_air;
    }

    /// Get the stall counter
    pub fn stall_counter(&self) -> i64 {
        self.stall_counter
    }

    /// Get the number of connected consumers
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Get the number of consumers that joined at a boundary
    pub fn live_consumer_count(&self) -> usize {
        self.consumers.iter().filter(|c| c.is_live()).count()
    }

    /// Check if a consumer is registered
    pub fn has_consumer(&self, id: ConsumerId) -> bool {
        self.consumers.iter().any(|c| c.id == id)
    }

    /// Get the running counters
    pub fn counters(&self) -> &RelayCounters {
        &self.counters
    }

    /// Record a watchdog-triggered restart
    pub fn record_restart(&mut self) {
        self.counters.upstream_restarts += 1;
    }

    /// Register a consumer
    ///
    /// The consumer starts in the not-live state; its response headers must
    /// announce the current [`boundary`](Self::boundary). Returns `false` if
    /// the connection went away before registration, in which case nothing
    /// is registered.
    pub fn add_consumer(&mut self, id: ConsumerId, sink: ConsumerSink) -> bool {
        if sink.is_closed() {
            tracing::debug!(consumer_id = id, "Consumer gone before registration");
            return false;
        }

        self.consumers.push(Consumer::new(id, sink));
        tracing::info!(
            consumer_id = id,
            consumers = self.consumers.len(),
            boundary = %self.boundary,
            "Consumer added"
        );
        true
    }

    /// Remove a consumer after its connection closed
    ///
    /// Dropping the consumer drops its sink, so nothing further can be
    /// queued for it.
    pub fn remove_consumer(&mut self, id: ConsumerId) -> bool {
        match self.consumers.iter().position(|c| c.id == id) {
            Some(pos) => {
                self.consumers.remove(pos);
                tracing::info!(
                    consumer_id = id,
                    consumers = self.consumers.len(),
                    "Consumer removed"
                );
                true
            }
            None => false,
        }
    }

    /// Handle a chunk from the upstream body
    ///
    /// A chunk carrying a boundary marker resets the stall counter. While on
    /// air, live consumers get the chunk verbatim and waiting consumers join
    /// at the marker, so their first bytes are always a part delimiter.
    pub fn handle_chunk(&mut self, chunk: &Bytes) {
        let marker = find_boundary(chunk, &self.boundary);
        if marker.is_some() {
            self.stall_counter = 0;
        }

        if !self.on_air {
            return;
        }

        self.counters.chunks_relayed += 1;
        self.counters.bytes_relayed += chunk.len() as u64;

        let mut failed = Vec::new();
        for consumer in self.consumers.iter_mut() {
            let result = if consumer.is_live() {
                consumer.send(chunk.clone())
            } else if let Some(offset) = marker {
                let result = consumer.send(chunk.slice(offset..));
                if result.is_ok() {
                    consumer.mark_live();
                    tracing::debug!(consumer_id = consumer.id, "Consumer joined at boundary");
                }
                result
            } else {
                Ok(())
            };

            if let Err(failure) = result {
                failed.push((consumer.id, failure));
            }
        }

        self.evict(failed);
    }

    /// Advance the watchdog by one tick
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        self.stall_counter += 1;
        if self.stall_counter > self.stall_ticks {
            self.stall_counter = -self.cooldown_ticks;
            outcome.restart_upstream = true;
            tracing::warn!("No frames received - restarting upstream request");
        }

        if self.on_air && self.stall_counter >= 0 {
            return outcome;
        }

        self.inject_still_frame();
        outcome.injected_still = true;
        outcome
    }

    /// Broadcast the next still image to every consumer
    ///
    /// The engine frames still parts itself, so every consumer is marked
    /// live regardless of whether it ever saw a real boundary.
    fn inject_still_frame(&mut self) {
        let image = if self.stills.is_empty() {
            Bytes::new()
        } else {
            let image = self.stills[self.still_index].clone();
            self.still_index = (self.still_index + 1) % self.stills.len();
            image
        };

        let part = still_frame_part(&self.boundary, &image);
        self.counters.still_frames_injected += 1;

        let mut failed = Vec::new();
        for consumer in self.consumers.iter_mut() {
            match consumer.send(part.clone()) {
                Ok(()) => consumer.mark_live(),
                Err(failure) => failed.push((consumer.id, failure)),
            }
        }

        self.evict(failed);
    }

    fn evict(&mut self, failed: Vec<(ConsumerId, SinkFailure)>) {
        if failed.is_empty() {
            return;
        }

        for (id, failure) in &failed {
            match failure {
                SinkFailure::Lagging => {
                    tracing::warn!(consumer_id = id, "Consumer too slow, dropping")
                }
                SinkFailure::Closed => {
                    tracing::debug!(consumer_id = id, "Consumer sink closed, dropping")
                }
            }
        }

        self.consumers
            .retain(|c| !failed.iter().any(|(id, _)| *id == c.id));
        self.counters.consumers_evicted += failed.len() as u64;
    }
}
