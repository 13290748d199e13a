//! Producer ingest listener
//!
//! Handles the TCP accept loop and spawns one task per producer connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};
use crate::registry::{RegistryConfig, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::{ProducerConnection, ProducerExit};

/// Producer ingest server
pub struct Ingestor {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    next_producer_id: AtomicU64,
    admission: Option<Arc<Semaphore>>,
}

impl Ingestor {
    /// Create a new ingestor with its own registry
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new ingestor with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        Self::with_registry(config, Arc::new(StreamRegistry::with_config(registry_config)))
    }

    /// Create a new ingestor feeding an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<StreamRegistry>) -> Self {
        let admission = if config.max_producers > 0 {
            Some(Arc::new(Semaphore::new(config.max_producers)))
        } else {
            None
        };

        Self {
            config,
            registry,
            next_producer_id: AtomicU64::new(1),
            admission,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            max_producers = self.config.max_producers,
            "Ingest server listening"
        );
        Ok(listener)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    ///
    /// Stops accepting once `shutdown` resolves. Producers already connected
    /// keep running until they disconnect.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Accept producers on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            // Admission control: wait for a slot before accepting, so the
            // next producer sits in the backlog rather than being refused.
            let permit = match self.admission {
                Some(ref sem) => match Arc::clone(sem).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return Ok(()),
                },
                None => None,
            };

            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, permit);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let producer_id = self.next_producer_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            producer_id = producer_id,
            peer = %peer_addr,
            available = self.admission.as_ref().map(|sem| sem.available_permits()),
            "New producer connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            // Held until the producer is torn down
            let _permit = permit;

            let connection = ProducerConnection::new(producer_id, socket, peer_addr, config, registry);

            match connection.run().await {
                Ok(ProducerExit::EndOfStream) => {}
                Ok(ProducerExit::ChannelClosed) => {
                    tracing::debug!(producer_id = producer_id, "Producer feed abandoned");
                }
                // Frame errors are already logged by the connection
                Err(Error::Protocol(_)) => {}
                Err(e) => {
                    tracing::warn!(
                        producer_id = producer_id,
                        peer = %peer_addr,
                        error = %e,
                        "Producer refused"
                    );
                }
            }

            tracing::debug!(producer_id = producer_id, "Producer connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
