//! Relay server listener
//!
//! Binds the TCP socket and serves viewers with axum.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::relay::RelayHandle;
use crate::server::config::ServerConfig;
use crate::server::viewer::{serve_viewer, ServerState};

/// HTTP server feeding viewers from a relay engine
pub struct RelayServer {
    config: ServerConfig,
    relay: RelayHandle,
    listener: TcpListener,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Bind the listening socket
    pub async fn bind(config: ServerConfig, relay: RelayHandle) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            relay,
            listener,
            connection_semaphore,
        })
    }

    /// Get the address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server
    ///
    /// This method runs until the process exits.
    pub async fn run(self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "MJPEG relay listening");

        let (listener, app, tcp_nodelay) = self.into_parts();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .tcp_nodelay(tcp_nodelay)
            .await?;
        Ok(())
    }

    /// Run the server with graceful shutdown
    ///
    /// Returns once `shutdown` completes. Open viewer streams end when the
    /// relay engine is shut down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr()?, "MJPEG relay listening");

        let (listener, app, tcp_nodelay) = self.into_parts();
        let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .tcp_nodelay(tcp_nodelay)
            .into_future();

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = serve => Ok(result?),
        }
    }

    fn into_parts(self) -> (TcpListener, Router, bool) {
        let state = ServerState {
            relay: self.relay,
            connection_semaphore: self.connection_semaphore,
        };
        let app = Router::new().fallback(serve_viewer).with_state(state);

        (self.listener, app, self.config.tcp_nodelay)
    }
}
