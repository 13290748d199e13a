//! Viewer HTTP server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

/// Viewer-facing HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Path prefix of stream routes (`/<prefix><N>`)
    pub stream_prefix: String,
    /// Number of stream routes, `/<prefix>0` up to `/<prefix><N-1>`
    pub stream_routes: u32,
    /// Directory served for every other path
    pub static_dir: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            stream_prefix: "stream".to_string(),
            stream_routes: 8,
            static_dir: None,
        }
    }
}

impl HttpConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefix = prefix.into();
        self
    }

    pub fn stream_routes(mut self, routes: u32) -> Self {
        self.stream_routes = routes;
        self
    }

    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }
}
