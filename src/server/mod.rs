//! Producer ingest server
//!
//! Accepts camera producer connections, performs the registration
//! handshake and pumps length-prefixed frames into the stream registry.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{ProducerConnection, ProducerExit};
pub use listener::Ingestor;
