//! Media handling
//!
//! This module provides:
//! - Quality levels and their ordering
//! - Frame codecs selected by the producer's stream type
//! - H.264 Annex-B NAL unit reassembly

pub mod codec;
pub mod h264;
pub mod quality;

pub use codec::{FrameCodec, H264Codec, MjpegCodec, StreamType};
pub use h264::{NalAssembler, NaluType};
pub use quality::Quality;
