//! Per-stream producer state
//!
//! A `ProducerStream` groups the quality feeds of one camera. Each live feed
//! belongs to exactly one producer connection; its receiving half waits here
//! until a broadcast group claims it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use super::error::RegistryError;
use super::frame::{Frame, StreamId};
use super::source::StreamConnection;
use crate::channel::{self, FrameReceiver, FrameSender};
use crate::media::{Quality, StreamType};

/// One quality feed of a stream
struct QualityFeed {
    /// Producer connection that owns the feed
    producer_id: u64,
    /// Receiving half, until a broadcast group claims it
    receiver: Option<FrameReceiver<Frame>>,
    /// When the producer attached
    attached_at: Instant,
}

/// Entry for a single stream in the registry
pub struct ProducerStream {
    id: StreamId,
    stream_type: StreamType,
    feeds: Mutex<BTreeMap<Quality, QualityFeed>>,
    created_at: Instant,
}

impl ProducerStream {
    pub(super) fn new(id: StreamId, stream_type: StreamType) -> Self {
        Self {
            id,
            stream_type,
            feeds: Mutex::new(BTreeMap::new()),
            created_at: Instant::now(),
        }
    }

    fn feeds(&self) -> MutexGuard<'_, BTreeMap<Quality, QualityFeed>> {
        self.feeds.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a producer for `quality`, returning the sending half of its feed
    pub(super) fn attach(
        &self,
        quality: Quality,
        producer_id: u64,
        capacity: usize,
    ) -> Result<FrameSender<Frame>, RegistryError> {
        let mut feeds = self.feeds();
        if feeds.contains_key(&quality) {
            return Err(RegistryError::QualityAlreadyLive(self.id.clone(), quality));
        }

        let (tx, rx) = channel::channel(capacity);
        feeds.insert(
            quality,
            QualityFeed {
                producer_id,
                receiver: Some(rx),
                attached_at: Instant::now(),
            },
        );
        Ok(tx)
    }

    /// Detach the producer of `quality`; returns true if the feed was removed
    pub(super) fn detach(&self, quality: Quality, producer_id: u64) -> bool {
        let mut feeds = self.feeds();
        match feeds.get(&quality) {
            Some(feed) if feed.producer_id == producer_id => {
                let feed = feeds.remove(&quality);
                if let Some(feed) = feed {
                    tracing::debug!(
                        stream = %self.id,
                        quality = %quality,
                        producer_id = producer_id,
                        claimed = feed.receiver.is_none(),
                        attached_secs = feed.attached_at.elapsed().as_secs(),
                        "Quality feed detached"
                    );
                }
                true
            }
            Some(feed) => {
                tracing::warn!(
                    stream = %self.id,
                    quality = %quality,
                    expected = feed.producer_id,
                    actual = producer_id,
                    "Producer detach mismatch"
                );
                false
            }
            None => false,
        }
    }

    /// Number of live quality feeds
    pub fn feed_count(&self) -> usize {
        self.feeds().len()
    }

    /// How long the stream has existed
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

impl StreamConnection for ProducerStream {
    fn id(&self) -> &StreamId {
        &self.id
    }

    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn output_channel(&self, quality: Quality) -> Option<FrameReceiver<Frame>> {
        self.feeds()
            .get_mut(&quality)
            .and_then(|feed| feed.receiver.take())
    }

    fn qualities(&self) -> Vec<Quality> {
        self.feeds().keys().copied().collect()
    }

    fn is_open(&self) -> bool {
        !self.feeds().is_empty()
    }
}
