//! Signaling server listener
//!
//! Handles the TCP accept loop, the WebSocket upgrade, and spawns one
//! handler task per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::accept_async;

use crate::error::Result;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::router::SignalingRouter;
use crate::server::config::ServerConfig;
use crate::server::connection::run_connection;

/// Signaling relay server
///
/// One accept loop, one spawned task per client channel, a single shared
/// registry as the only mutable state. A misbehaving connection ends its
/// own task and nothing else.
pub struct SignalServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    router: Arc<SignalingRouter>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl SignalServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(SignalingRouter::new(Arc::clone(&registry)));

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            router,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Signaling server listening");

        let _stats_handle = self.spawn_stats_task();

        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Signaling server listening");

        let stats_handle = self.spawn_stats_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        stats_handle.abort();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(connection_id = id.get(), peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let registry = Arc::clone(&self.registry);
        let router = Arc::clone(&self.router);
        let outbound_queue = self.config.outbound_queue;

        tokio::spawn(async move {
            // Permit lives for the whole connection
            let _permit = permit;

            match accept_async(socket).await {
                Ok(ws) => {
                    run_connection(ws, id, peer_addr, registry, router, outbound_queue).await;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = id.get(),
                        peer = %peer_addr,
                        error = %e,
                        "WebSocket handshake failed"
                    );
                }
            }
        });
    }

    /// Spawn the periodic stats log task
    fn spawn_stats_task(&self) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let interval = self.config.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // First tick completes immediately
            loop {
                ticker.tick().await;
                let connections = registry.connection_count().await;
                let rooms = registry.room_count().await;
                tracing::debug!(connections, rooms, "Server stats");
            }
        })
    }
}
