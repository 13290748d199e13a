//! Ingest server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Ingest server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrently open producer connections (0 = unlimited)
    ///
    /// Once reached, accepting waits until a producer disconnects.
    pub max_producers: usize,

    /// Prefix combined with the handshake's stream index to form a stream ID
    pub stream_prefix: String,

    /// Handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Largest single socket read while receiving a frame body
    pub read_chunk_size: usize,

    /// Largest frame body accepted from a producer
    pub max_frame_size: usize,

    /// Throughput logging interval
    pub stats_interval: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_INGEST_PORT)),
            max_producers: 8,
            stream_prefix: "stream".to_string(),
            handshake_timeout: Duration::from_secs(10),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            stats_interval: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum concurrent producers
    pub fn max_producers(mut self, max: usize) -> Self {
        self.max_producers = max;
        self
    }

    /// Set the stream ID prefix
    pub fn stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefix = prefix.into();
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set read chunk size (minimum 1)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set throughput logging interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}
