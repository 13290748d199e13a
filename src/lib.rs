//! camstream-rs: camera stream relay
//!
//! Producers (cameras) push length-prefixed MJPEG or H.264 frames over TCP;
//! viewers pull them over HTTP multipart or WebSocket. Each viewer's quality
//! follows the frame rate it actually manages to receive.
//!
//! # Architecture
//!
//! ```text
//!   camera ──TCP──► Ingestor ──► ProducerConnection ──► StreamRegistry
//!                   (admission)   (handshake, framing,   (stream ─► quality ─► channel)
//!                                  codec reassembly)              │
//!                                                                 ▼
//!   browser ◄─HTTP/WS── HttpServer ◄── DeliverySession ◄── Broadcaster / BroadcastGroup
//!                                      (quality control)   (fan-out, forced downgrade)
//! ```
//!
//! Every hop between tasks is a bounded drop-oldest [`channel`], so a slow
//! viewer can never stall its broadcast group and a stalled group can never
//! stall a producer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camstream_rs::broadcast::Broadcaster;
//! use camstream_rs::http::{HttpConfig, HttpServer};
//! use camstream_rs::registry::StreamSource;
//! use camstream_rs::server::{Ingestor, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> camstream_rs::Result<()> {
//!     let ingestor = Ingestor::new(ServerConfig::default());
//!     let source = Arc::clone(ingestor.registry()) as Arc<dyn StreamSource>;
//!     let broadcaster = Arc::new(Broadcaster::new(source));
//!     let http = HttpServer::new(HttpConfig::default(), broadcaster);
//!
//!     tokio::try_join!(ingestor.run(), http.run())?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod channel;
pub mod delivery;
pub mod error;
pub mod http;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use broadcast::{BroadcastConfig, Broadcaster};
pub use delivery::{ControllerConfig, DeliveryConfig};
pub use error::{Error, Result};
pub use http::{HttpConfig, HttpServer};
pub use media::{Quality, StreamType};
pub use registry::{RegistryConfig, StreamId, StreamRegistry};
pub use server::{Ingestor, ServerConfig};
