//! Viewer-facing HTTP surface
//!
//! ```text
//!  GET /                 ──► 303 /index.html
//!  GET /<prefix><N>      ──► MJPEG stream:  multipart/x-mixed-replace body
//!                        └─► H.264 stream:  WebSocket, one NAL unit per message
//!  GET /<anything else>  ──► static directory (if configured)
//! ```
//!
//! A stream route with no live producer answers `404 Not Found`. The query
//! parameter `quality=low|high` picks the viewer's initial quality.

pub mod config;
pub mod server;

pub use config::HttpConfig;
pub use server::HttpServer;
