//! Downstream consumers
//!
//! A consumer is one connected client. The engine only holds the sending
//! half of a bounded queue; the HTTP response body owns the receiving half
//! and streams it to the socket.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Unique identifier for a consumer
pub type ConsumerId = u64;

/// Sending half of a consumer's output queue
pub type ConsumerSink = mpsc::Sender<Bytes>;

/// Why a write to a consumer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFailure {
    /// Queue is full, the client is not keeping up
    Lagging,
    /// Response body is gone
    Closed,
}

/// A registered consumer as seen by the connection that owns it
#[derive(Debug)]
pub struct Subscription {
    /// Consumer ID, needed to remove the consumer again
    pub id: ConsumerId,

    /// Boundary to announce in the response `content-type`
    pub boundary: String,

    /// Bytes to write to the client, in order
    pub queue: mpsc::Receiver<Bytes>,
}

/// A single downstream client
#[derive(Debug)]
pub struct Consumer {
    /// Consumer ID
    pub id: ConsumerId,

    /// Output queue
    sink: ConsumerSink,

    /// Whether this consumer has received a boundary-aligned byte range
    is_live: bool,
}

impl Consumer {
    /// Create a consumer that still waits for a frame boundary
    pub fn new(id: ConsumerId, sink: ConsumerSink) -> Self {
        Self {
            id,
            sink,
            is_live: false,
        }
    }

    /// Check if raw chunks can be forwarded as-is
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    /// Mark the consumer as joined at a boundary
    pub fn mark_live(&mut self) {
        self.is_live = true;
    }

    /// Queue bytes without waiting
    pub fn send(&self, data: Bytes) -> Result<(), SinkFailure> {
        self.sink.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkFailure::Lagging,
            mpsc::error::TrySendError::Closed(_) => SinkFailure::Closed,
        })
    }
}
