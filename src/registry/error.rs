//! Registry error types
//!
//! Error types for stream registry and broadcaster operations.

use super::frame::StreamId;
use crate::media::{Quality, StreamType};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No producer is registered for the stream
    StreamNotFound(StreamId),
    /// The stream already has a live producer for this quality
    QualityAlreadyLive(StreamId, Quality),
    /// Producer announced a different stream type than the live stream has
    StreamTypeMismatch {
        stream: StreamId,
        existing: StreamType,
        announced: StreamType,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            RegistryError::QualityAlreadyLive(id, quality) => {
                write!(f, "Stream {} already has a {} quality producer", id, quality)
            }
            RegistryError::StreamTypeMismatch {
                stream,
                existing,
                announced,
            } => write!(
                f,
                "Stream {} is {}, producer announced {}",
                stream, existing, announced
            ),
        }
    }
}

impl std::error::Error for RegistryError {}
