//! Per-viewer request handling
//!
//! Every request, whatever its method or path, registers a consumer with
//! the engine and gets the relayed stream as its response body. The body
//! owns a guard, so when hyper drops it (client gone or server shutting
//! down) the consumer is removed.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_stream::wrappers::ReceiverStream;

use crate::multipart::response_headers;
use crate::relay::{ConsumerId, RelayHandle};

/// Shared state for the request handler
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) relay: RelayHandle,
    pub(crate) connection_semaphore: Option<Arc<Semaphore>>,
}

/// Serve the relayed stream to one viewer
pub(crate) async fn serve_viewer(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Response {
    // Check connection limit
    let permit = match &state.connection_semaphore {
        Some(sem) => match sem.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer, "Viewer rejected: limit reached");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => None,
    };

    let subscription = match state.relay.add_consumer().await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Viewer rejected");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let guard = ConsumerGuard {
        id: subscription.id,
        peer,
        relay: state.relay,
        _permit: permit,
    };

    let headers = match response_headers(&subscription.boundary) {
        Ok(headers) => headers,
        Err(e) => {
            tracing::error!(boundary = %subscription.boundary, error = %e, "Boundary is not a valid header value");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    tracing::info!(
        consumer_id = subscription.id,
        peer = %peer,
        path = %uri.path(),
        boundary = %subscription.boundary,
        "Viewer connected"
    );

    let body = ViewerStream {
        queue: ReceiverStream::new(subscription.queue),
        _guard: guard,
    };
    (headers, Body::from_stream(body)).into_response()
}

/// Response body draining a consumer queue
struct ViewerStream {
    queue: ReceiverStream<Bytes>,
    _guard: ConsumerGuard,
}

impl Stream for ViewerStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.queue).poll_next(cx).map(|chunk| chunk.map(Ok))
    }
}

/// Removes the consumer from the engine when the response body is dropped
struct ConsumerGuard {
    id: ConsumerId,
    peer: SocketAddr,
    relay: RelayHandle,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        tracing::info!(consumer_id = self.id, peer = %self.peer, "Viewer disconnected");
        self.relay.release_consumer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::relay::{RelayConfig, RelayEngine};
    use crate::upstream::UpstreamConfig;

    async fn relay() -> RelayHandle {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = RelayConfig::default()
            .tick_interval(Duration::from_millis(20))
            .stall_timeout(Duration::from_millis(100));
        let upstream = UpstreamConfig::new(format!("http://{}/video", addr));
        RelayEngine::spawn(config, upstream, vec![Bytes::from_static(b"IDLE")]).unwrap()
    }

    async fn consumers(relay: &RelayHandle) -> usize {
        relay.stats().await.unwrap().consumers
    }

    #[tokio::test]
    async fn test_dropping_body_removes_consumer() {
        let relay = relay().await;
        let subscription = relay.add_consumer().await.unwrap();

        let mut body = ViewerStream {
            queue: ReceiverStream::new(subscription.queue),
            _guard: ConsumerGuard {
                id: subscription.id,
                peer: SocketAddr::from(([127, 0, 0, 1], 40000)),
                relay: relay.clone(),
                _permit: None,
            },
        };

        let part = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(part.ends_with(b"IDLE"));
        assert_eq!(consumers(&relay).await, 1);

        drop(body);
        assert_eq!(consumers(&relay).await, 0);

        relay.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_permit_released_with_body() {
        let relay = relay().await;
        let semaphore = Arc::new(Semaphore::new(1));
        let subscription = relay.add_consumer().await.unwrap();

        let guard = ConsumerGuard {
            id: subscription.id,
            peer: SocketAddr::from(([127, 0, 0, 1], 40001)),
            relay: relay.clone(),
            _permit: Some(semaphore.clone().try_acquire_owned().unwrap()),
        };
        assert_eq!(semaphore.available_permits(), 0);

        drop(guard);
        assert_eq!(semaphore.available_permits(), 1);

        relay.shutdown().await.unwrap();
    }
}
