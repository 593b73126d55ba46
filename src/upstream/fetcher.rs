//! Streaming upstream request
//!
//! Each call to [`UpstreamFetcher::start`] opens a new generation. Events
//! are tagged with the generation that produced them, and the fetcher only
//! accepts events from the current one, so a torn-down connection can never
//! feed the broadcaster even if some of its chunks are still queued.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::multipart::extract_boundary;

use super::config::UpstreamConfig;

/// State of the upstream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamPhase {
    /// No connection
    Idle,
    /// Request sent, waiting for response headers
    Requesting,
    /// Headers received, body is flowing
    Streaming,
}

/// Event from an upstream connection
#[derive(Debug)]
pub struct UpstreamEvent {
    /// Generation of the connection that produced this event
    pub generation: u64,
    /// What happened
    pub kind: UpstreamEventKind,
}

/// Kind of upstream event
#[derive(Debug)]
pub enum UpstreamEventKind {
    /// Response headers received
    ///
    /// `boundary` is `None` when the `content-type` carried no usable
    /// boundary; the previous token stays in effect.
    Connected { boundary: Option<String> },
    /// Body chunk
    Chunk(Bytes),
    /// Body ended cleanly
    Ended,
    /// Request or body failed
    Failed(Error),
}

/// Owner of the single upstream connection
pub struct UpstreamFetcher {
    client: Client,
    url: Url,
    events: mpsc::Sender<UpstreamEvent>,
    generation: u64,
    phase: UpstreamPhase,
    task: Option<JoinHandle<()>>,
}

impl UpstreamFetcher {
    /// Create a fetcher that reports to `events`
    pub fn new(config: &UpstreamConfig, events: mpsc::Sender<UpstreamEvent>) -> Result<Self> {
        let url = config.parse_url()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            url,
            events,
            generation: 0,
            phase: UpstreamPhase::Idle,
            task: None,
        })
    }

    /// Get the current generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Get the connection phase
    pub fn phase(&self) -> UpstreamPhase {
        self.phase
    }

    /// Start a new upstream request
    ///
    /// Any previous connection is torn down first.
    pub fn start(&mut self) {
        self.stop();

        self.generation += 1;
        self.phase = UpstreamPhase::Requesting;

        tracing::info!(url = %self.url, generation = self.generation, "Starting upstream request");

        let task = stream_upstream(
            self.client.clone(),
            self.url.clone(),
            self.generation,
            self.events.clone(),
        );
        self.task = Some(tokio::spawn(task));
    }

    /// Tear down the current connection, if any
    ///
    /// Aborting the task drops the response (destroying the body stream) or
    /// the pending request future (aborting the request).
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            match self.phase {
                UpstreamPhase::Streaming => {
                    tracing::debug!(generation = self.generation, "Destroying upstream response")
                }
                UpstreamPhase::Requesting => {
                    tracing::debug!(generation = self.generation, "Aborting upstream request")
                }
                UpstreamPhase::Idle => {}
            }
            task.abort();
        }
        self.phase = UpstreamPhase::Idle;
    }

    /// Filter an event and track the connection phase
    ///
    /// Returns `false` for events from a stale generation, which must be
    /// ignored.
    pub fn accept(&mut self, event: &UpstreamEvent) -> bool {
        if event.generation != self.generation {
            return false;
        }

        match &event.kind {
            UpstreamEventKind::Connected { .. } => {
                self.phase = UpstreamPhase::Streaming;
            }
            UpstreamEventKind::Chunk(_) => {}
            UpstreamEventKind::Ended | UpstreamEventKind::Failed(_) => {
                self.phase = UpstreamPhase::Idle;
                self.task = None;
            }
        }

        true
    }
}

impl Drop for UpstreamFetcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run one upstream request until the body ends or fails
async fn stream_upstream(
    client: Client,
    url: Url,
    generation: u64,
    events: mpsc::Sender<UpstreamEvent>,
) {
    let send = |kind| {
        let events = events.clone();
        async move { events.send(UpstreamEvent { generation, kind }).await.is_ok() }
    };

    let mut response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(generation, error = %e, "Upstream request failed");
            send(UpstreamEventKind::Failed(e.into())).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(generation, %status, "Upstream returned error status");
        send(UpstreamEventKind::Failed(Error::UpstreamStatus(status))).await;
        return;
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let boundary = match extract_boundary(content_type) {
        Ok(boundary) => Some(boundary),
        Err(e) => {
            tracing::warn!(generation, error = %e, "Keeping previous boundary");
            None
        }
    };

    tracing::info!(generation, ?boundary, "Upstream connected");
    if !send(UpstreamEventKind::Connected { boundary }).await {
        return;
    }

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if !send(UpstreamEventKind::Chunk(chunk)).await {
                    return;
                }
            }
            Ok(None) => {
                tracing::info!(generation, "Upstream stream ended");
                send(UpstreamEventKind::Ended).await;
                return;
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "Upstream body error");
                send(UpstreamEventKind::Failed(e.into())).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> (UpstreamFetcher, mpsc::Receiver<UpstreamEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let config = UpstreamConfig::new("http://127.0.0.1:9/stream");
        (UpstreamFetcher::new(&config, tx).unwrap(), rx)
    }

    fn event(generation: u64, kind: UpstreamEventKind) -> UpstreamEvent {
        UpstreamEvent { generation, kind }
    }

    #[test]
    fn test_new_requires_url() {
        let (tx, _rx) = mpsc::channel(1);
        let result = UpstreamFetcher::new(&UpstreamConfig::default(), tx);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_generations_and_phase() {
        let (mut fetcher, _rx) = fetcher();
        assert_eq!(fetcher.phase(), UpstreamPhase::Idle);

        fetcher.start();
        assert_eq!(fetcher.generation(), 1);
        assert_eq!(fetcher.phase(), UpstreamPhase::Requesting);

        assert!(fetcher.accept(&event(1, UpstreamEventKind::Connected { boundary: None })));
        assert_eq!(fetcher.phase(), UpstreamPhase::Streaming);

        fetcher.start();
        assert_eq!(fetcher.generation(), 2);
        assert_eq!(fetcher.phase(), UpstreamPhase::Requesting);

        // Leftovers from the first connection are rejected
        assert!(!fetcher.accept(&event(1, UpstreamEventKind::Chunk(Bytes::from_static(b"x")))));
        assert!(fetcher.accept(&event(2, UpstreamEventKind::Chunk(Bytes::from_static(b"x")))));

        fetcher.stop();
        assert_eq!(fetcher.phase(), UpstreamPhase::Idle);
    }

    #[tokio::test]
    async fn test_failure_returns_to_idle() {
        let (mut fetcher, _rx) = fetcher();
        fetcher.start();

        let failed = event(1, UpstreamEventKind::Failed(Error::EngineClosed));
        assert!(fetcher.accept(&failed));
        assert_eq!(fetcher.phase(), UpstreamPhase::Idle);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::channel(16);
        let config = UpstreamConfig::new(format!("http://{}/stream", addr));
        let mut fetcher = UpstreamFetcher::new(&config, tx).unwrap();
        fetcher.start();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.generation, 1);
        assert!(matches!(event.kind, UpstreamEventKind::Failed(Error::Upstream(_))));
    }
}
