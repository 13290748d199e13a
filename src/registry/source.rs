//! Ingestion backend contract
//!
//! The broadcast side only talks to ingestion through these two traits, so a
//! different transport can feed the same broadcaster by implementing them.

use std::sync::Arc;

use super::frame::{Frame, StreamId};
use crate::channel::FrameReceiver;
use crate::media::{Quality, StreamType};

/// One camera stream with a frame channel per live quality
pub trait StreamConnection: Send + Sync {
    fn id(&self) -> &StreamId;

    fn stream_type(&self) -> StreamType;

    /// Hand over the receiving half of a quality's frame channel
    ///
    /// Returns `None` if the quality has no live producer or its channel has
    /// already been handed to a consumer.
    fn output_channel(&self, quality: Quality) -> Option<FrameReceiver<Frame>>;

    /// Qualities with a live producer, lowest first
    fn qualities(&self) -> Vec<Quality>;

    /// Whether any quality still has a live producer
    fn is_open(&self) -> bool;
}

/// Lookup of stream connections by ID
pub trait StreamSource: Send + Sync {
    fn get_stream(&self, id: &StreamId) -> Option<Arc<dyn StreamConnection>>;
}
