//! Viewer delivery
//!
//! One [`DeliverySession`] per viewer. It pulls frames from the viewer's
//! outbound channel, writes them through a transport [`FrameSink`], and runs
//! the adaptive [`QualityController`] on the delivered rate.
//!
//! ```text
//!  Viewer outbound ──► [LatestFrame] ──► DeliverySession ──► MjpegSink     (multipart body)
//!                                                      └──► WebSocketSink (binary messages)
//! ```
//!
//! MJPEG goes through a [`LatestFrame`] cell so a slow client always gets the
//! freshest picture. H.264 reads the outbound channel directly, since every
//! NAL unit matters to the decoder.

pub mod cleaner;
pub mod controller;
pub mod mjpeg;
pub mod session;
pub mod websocket;

pub use cleaner::LatestFrame;
pub use controller::{ControllerConfig, QualityAdjustment, QualityController};
pub use mjpeg::MjpegSink;
pub use session::{DeliveryConfig, DeliveryEnd, DeliveryPhase, DeliverySession, FrameInput, FrameSink};
pub use websocket::{watch_client, WebSocketSink};
