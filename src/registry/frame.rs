//! Stream identifiers and broadcast frames

use bytes::Bytes;

use crate::media::Quality;

/// Unique identifier for a camera stream (prefix + numeric index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    /// Create a stream ID from an arbitrary key
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the ID a producer registers under, e.g. `stream3`
    pub fn from_index(prefix: &str, index: u32) -> Self {
        Self(format!("{}{}", prefix, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of video: a JPEG image or one NAL unit
///
/// Cheap to clone; every viewer of a quality shares the same `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Quality feed this frame came from
    pub quality: Quality,
    /// Position in the producer's output, starting at 1
    pub sequence: u64,
    /// Encoded frame data
    pub data: Bytes,
}

impl Frame {
    pub fn new(quality: Quality, sequence: u64, data: Bytes) -> Self {
        Self {
            quality,
            sequence,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
