//! Producer wire protocol
//!
//! Producers connect over plain TCP. Every integer is a little-endian i32.
//!
//! ```text
//! Producer                                  Ingestor
//!   |                                          |
//!   |--- streamIndex, streamTypeTag, quality ->|   handshake (12 bytes)
//!   |                                          |
//!   |--- length, payload[length] ------------->|   repeated
//!   |--- length, payload[length] ------------->|
//!   |--- 0 ----------------------------------->|   graceful end of stream
//! ```
//!
//! `streamTypeTag` is 0 for MJPEG and 1 for H.264; `quality` is 0 for low and
//! 1 for high.

pub mod constants;
pub mod framing;
pub mod handshake;

pub use framing::{encode_end_of_stream, encode_frame, FrameReader};
pub use handshake::Handshake;
