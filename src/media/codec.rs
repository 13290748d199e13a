//! Frame codecs
//!
//! The producer's stream-type tag picks a codec once, when the connection
//! registers. The codec turns each length-prefixed payload into the frames
//! that go onto the quality's frame channel.

use std::fmt;

use bytes::Bytes;

use super::h264::{NalAssembler, NaluType};

/// Stream type announced in the producer handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Each payload is one complete JPEG image
    Mjpeg,
    /// Payloads are raw Annex-B encoder output
    H264,
}

impl StreamType {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(StreamType::Mjpeg),
            1 => Some(StreamType::H264),
            _ => None,
        }
    }

    pub fn tag(self) -> i32 {
        match self {
            StreamType::Mjpeg => 0,
            StreamType::H264 => 1,
        }
    }

    /// Create the codec for this stream type
    ///
    /// `max_frame_size` bounds what a codec may buffer for one frame.
    pub fn codec(self, max_frame_size: usize) -> Box<dyn FrameCodec> {
        match self {
            StreamType::Mjpeg => Box::new(MjpegCodec),
            StreamType::H264 => Box::new(H264Codec::new(max_frame_size)),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Mjpeg => write!(f, "mjpeg"),
            StreamType::H264 => write!(f, "h264"),
        }
    }
}

/// Decoder from wire payloads to broadcast frames
pub trait FrameCodec: Send {
    /// Decode one payload, pushing finished frames onto `out`
    fn decode(&mut self, payload: Bytes, out: &mut Vec<Bytes>);

    /// Flush buffered state once the producer ended the stream cleanly
    fn finish(&mut self, _out: &mut Vec<Bytes>) {}

    fn stream_type(&self) -> StreamType;
}

/// Pass-through codec: one payload is one JPEG frame
#[derive(Debug, Default)]
pub struct MjpegCodec;

impl FrameCodec for MjpegCodec {
    fn decode(&mut self, payload: Bytes, out: &mut Vec<Bytes>) {
        if !payload.starts_with(&[0xFF, 0xD8]) {
            tracing::trace!(len = payload.len(), "Payload without JPEG SOI marker");
        }
        out.push(payload);
    }

    fn stream_type(&self) -> StreamType {
        StreamType::Mjpeg
    }
}

/// Annex-B reassembling codec: one frame is one NAL unit
#[derive(Debug, Default)]
pub struct H264Codec {
    assembler: NalAssembler,
    keyframes: u64,
}

impl H264Codec {
    /// Create a codec that drops NAL units larger than `max_unit` bytes
    pub fn new(max_unit: usize) -> Self {
        Self {
            assembler: NalAssembler::with_max_unit(max_unit),
            keyframes: 0,
        }
    }

    /// Number of IDR units emitted so far
    pub fn keyframes(&self) -> u64 {
        self.keyframes
    }

    fn inspect(&mut self, units: &[Bytes]) {
        for unit in units {
            match NaluType::of_unit(unit) {
                Some(t) if t.is_keyframe() => {
                    self.keyframes += 1;
                    tracing::trace!(keyframes = self.keyframes, len = unit.len(), "IDR unit");
                }
                Some(t) if t.is_parameter_set() => {
                    tracing::trace!(nal_type = ?t, "Parameter set unit");
                }
                _ => {}
            }
        }
    }
}

impl FrameCodec for H264Codec {
    fn decode(&mut self, payload: Bytes, out: &mut Vec<Bytes>) {
        let start = out.len();
        let oversized = self.assembler.oversized();
        self.assembler.push(&payload, out);
        if self.assembler.oversized() > oversized {
            tracing::warn!(
                max_unit = self.assembler.max_unit(),
                dropped = self.assembler.oversized(),
                "NAL unit exceeded size limit, dropped"
            );
        }
        self.inspect(&out[start..]);
    }

    fn finish(&mut self, out: &mut Vec<Bytes>) {
        let start = out.len();
        self.assembler.finish(out);
        self.inspect(&out[start..]);
    }

    fn stream_type(&self) -> StreamType {
        StreamType::H264
    }
}
