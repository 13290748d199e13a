//! Stream registry implementation
//!
//! The central registry that tracks which camera streams have live producers
//! and hands out their frame channels.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::config::RegistryConfig;
use super::entry::ProducerStream;
use super::error::RegistryError;
use super::frame::{Frame, StreamId};
use super::source::{StreamConnection, StreamSource};
use crate::channel::FrameSender;
use crate::media::{Quality, StreamType};

/// Central registry for all active streams
///
/// Thread-safe via `RwLock`. Lookups from the HTTP side vastly outnumber
/// producer registrations, so reads are shared.
pub struct StreamRegistry {
    /// Map of stream ID to its producer state
    streams: RwLock<HashMap<StreamId, Arc<ProducerStream>>>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<StreamId, Arc<ProducerStream>>> {
        self.streams.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<StreamId, Arc<ProducerStream>>> {
        self.streams.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a producer for one quality of a stream
    ///
    /// Creates the stream on first registration. Returns the sending half of
    /// the quality's frame channel. Fails if that quality already has a live
    /// producer or the stream was announced with a different stream type.
    pub fn register_producer(
        &self,
        id: &StreamId,
        stream_type: StreamType,
        quality: Quality,
        producer_id: u64,
    ) -> Result<FrameSender<Frame>, RegistryError> {
        let mut streams = self.write();

        let stream = match streams.get(id) {
            Some(stream) => {
                if stream.stream_type() != stream_type {
                    return Err(RegistryError::StreamTypeMismatch {
                        stream: id.clone(),
                        existing: stream.stream_type(),
                        announced: stream_type,
                    });
                }
                Arc::clone(stream)
            }
            None => {
                let stream = Arc::new(ProducerStream::new(id.clone(), stream_type));
                streams.insert(id.clone(), Arc::clone(&stream));
                tracing::info!(stream = %id, stream_type = %stream_type, "Stream created");
                stream
            }
        };

        let tx = stream.attach(quality, producer_id, self.config.frame_channel_capacity)?;

        tracing::info!(
            stream = %id,
            quality = %quality,
            producer_id = producer_id,
            feeds = stream.feed_count(),
            "Producer registered"
        );

        Ok(tx)
    }

    /// Unregister a producer
    ///
    /// The stream is removed once its last quality feed is gone.
    pub fn unregister_producer(&self, id: &StreamId, quality: Quality, producer_id: u64) {
        let mut streams = self.write();

        let Some(stream) = streams.get(id) else {
            return;
        };

        if !stream.detach(quality, producer_id) {
            return;
        }

        tracing::info!(
            stream = %id,
            quality = %quality,
            producer_id = producer_id,
            "Producer unregistered"
        );

        if !stream.is_open() {
            let age = stream.age();
            streams.remove(id);
            tracing::info!(stream = %id, age_secs = age.as_secs(), "Stream removed");
        }
    }

    /// Look up a stream by ID
    pub fn get(&self, id: &StreamId) -> Option<Arc<ProducerStream>> {
        self.read().get(id).cloned()
    }

    /// Check if a stream has at least one live producer
    pub fn has_active_stream(&self, id: &StreamId) -> bool {
        self.read().get(id).is_some_and(|stream| stream.is_open())
    }

    /// Get total number of streams
    pub fn stream_count(&self) -> usize {
        self.read().len()
    }

    /// Get total number of live producers across all streams
    pub fn producer_count(&self) -> usize {
        self.read().values().map(|stream| stream.feed_count()).sum()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSource for StreamRegistry {
    fn get_stream(&self, id: &StreamId) -> Option<Arc<dyn StreamConnection>> {
        self.get(id).map(|stream| stream as Arc<dyn StreamConnection>)
    }
}
