//! Relay engine task
//!
//! A single task owns the [`RelayState`] and the [`UpstreamFetcher`]. Client
//! connections, the upstream body and the watchdog ticker all reach it as
//! events on one `select!` loop, so engine state is never shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::stats::RelayStats;
use crate::upstream::{UpstreamConfig, UpstreamEvent, UpstreamEventKind, UpstreamFetcher};

use super::config::RelayConfig;
use super::consumer::{ConsumerId, ConsumerSink, Subscription};
use super::state::RelayState;

/// Capacity of the command and upstream event queues
const EVENT_QUEUE_CAPACITY: usize = 256;

enum Command {
    AddConsumer {
        id: ConsumerId,
        sink: ConsumerSink,
        reply: oneshot::Sender<String>,
    },
    RemoveConsumer(ConsumerId),
    SetOnAir(bool),
    Stats(oneshot::Sender<RelayStats>),
    Shutdown,
}

/// The relay engine
pub struct RelayEngine {
    config: RelayConfig,
    state: RelayState,
    fetcher: UpstreamFetcher,
    commands: mpsc::Receiver<Command>,
    upstream_events: mpsc::Receiver<UpstreamEvent>,
}

impl RelayEngine {
    /// Validate configuration and spawn the engine task
    ///
    /// Must be called from within a tokio runtime. The upstream request is
    /// opened right away.
    pub fn spawn(
        config: RelayConfig,
        upstream: UpstreamConfig,
        stills: Vec<Bytes>,
    ) -> Result<RelayHandle> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let fetcher = UpstreamFetcher::new(&upstream, event_tx)?;
        let state = RelayState::new(&config, stills);

        let handle = RelayHandle {
            commands: command_tx,
            next_consumer_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: config.consumer_queue_capacity,
        };

        let engine = Self {
            config,
            state,
            fetcher,
            commands: command_rx,
            upstream_events: event_rx,
        };
        tokio::spawn(engine.run());

        Ok(handle)
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            stall_ticks = self.config.stall_ticks(),
            cooldown_ticks = self.config.cooldown_ticks(),
            "Relay engine started"
        );
        self.fetcher.start();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.upstream_events.recv() => self.handle_upstream(event),
                _ = ticker.tick() => self.handle_tick(),
            }
        }

        self.fetcher.stop();
        tracing::info!("Relay engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddConsumer { id, sink, reply } => {
                if self.state.add_consumer(id, sink) {
                    let _ = reply.send(self.state.boundary().to_string());
                }
            }
            Command::RemoveConsumer(id) => {
                self.state.remove_consumer(id);
            }
            Command::SetOnAir(on_air) => {
                tracing::info!(on_air, "On-air changed");
                self.state.set_on_air(on_air);
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_upstream(&mut self, event: UpstreamEvent) {
        if !self.fetcher.accept(&event) {
            tracing::trace!(generation = event.generation, "Ignoring stale upstream event");
            return;
        }

        match event.kind {
            UpstreamEventKind::Connected { boundary } => {
                if let Some(boundary) = boundary {
                    self.state.set_boundary(boundary);
                }
            }
            UpstreamEventKind::Chunk(chunk) => self.state.handle_chunk(&chunk),
            UpstreamEventKind::Ended => {
                tracing::debug!(generation = event.generation, "Upstream idle until watchdog restart");
            }
            UpstreamEventKind::Failed(e) => {
                tracing::debug!(
                    generation = event.generation,
                    error = %e,
                    "Upstream idle until watchdog restart"
                );
            }
        }
    }

    fn handle_tick(&mut self) {
        let outcome = self.state.tick();
        if outcome.restart_upstream {
            self.state.record_restart();
            self.fetcher.start();
        }
    }

    fn stats(&self) -> RelayStats {
        RelayStats {
            consumers: self.state.consumer_count(),
            live_consumers: self.state.live_consumer_count(),
            boundary: self.state.boundary().to_string(),
            on_air: self.state.on_air(),
            stall_counter: self.state.stall_counter(),
            upstream_phase: self.fetcher.phase(),
            counters: self.state.counters().clone(),
        }
    }
}

/// Handle for talking to a running relay engine
///
/// Cheap to clone; the engine stops when every handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<Command>,
    next_consumer_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl RelayHandle {
    /// Register a new consumer
    ///
    /// The returned [`Subscription`] carries the boundary the response
    /// headers must announce and the queue of bytes to write after them.
    /// The consumer must be removed with
    /// [`remove_consumer`](Self::remove_consumer) or
    /// [`release_consumer`](Self::release_consumer) once its connection
    /// closes.
    pub async fn add_consumer(&self) -> Result<Subscription> {
        let id = self.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        let (sink, queue) = mpsc::channel(self.queue_capacity);
        let (reply, boundary) = oneshot::channel();

        self.send(Command::AddConsumer { id, sink, reply }).await?;
        let boundary = boundary.await.map_err(|_| Error::EngineClosed)?;

        Ok(Subscription {
            id,
            boundary,
            queue,
        })
    }

    /// Remove a consumer whose connection closed
    pub async fn remove_consumer(&self, id: ConsumerId) -> Result<()> {
        self.send(Command::RemoveConsumer(id)).await
    }

    /// Remove a consumer without waiting, for use from `Drop`
    ///
    /// If the command queue is full the removal is finished on a spawned
    /// task. A consumer that is never removed is still evicted on its next
    /// write, since its queue is closed.
    pub fn release_consumer(&self, id: ConsumerId) {
        match self.commands.try_send(Command::RemoveConsumer(id)) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let commands = self.commands.clone();
                    runtime.spawn(async move {
                        let _ = commands.send(command).await;
                    });
                }
            }
        }
    }

    /// Enable or suppress live relay
    pub async fn set_on_air(&self, on_air: bool) -> Result<()> {
        self.send(Command::SetOnAir(on_air)).await
    }

    /// Get a snapshot of relay statistics
    pub async fn stats(&self) -> Result<RelayStats> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx)).await?;
        rx.await.map_err(|_| Error::EngineClosed)
    }

    /// Stop the engine and tear down the upstream connection
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Check if the engine task has exited
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::EngineClosed)
    }
}
