//! Error types
//!
//! Every error is scoped to the task that raised it. A handshake failure only
//! closes that producer connection, a protocol failure only ends that stream
//! connection, and a delivery failure only ends that viewer. Nothing here is
//! process-fatal except failing to bind a listener.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug)]
pub enum Error {
    /// Socket level I/O failure
    Io(io::Error),
    /// Producer registration handshake failed
    Handshake(HandshakeError),
    /// Length-prefixed frame could not be read
    Protocol(ProtocolError),
    /// Quality change outside the supported range
    Quality(QualityRangeError),
    /// Writing to a viewer failed
    Delivery(DeliveryError),
    /// Stream registry rejected the operation
    Registry(RegistryError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Quality(e) => write!(f, "Quality error: {}", e),
            Error::Delivery(e) => write!(f, "Delivery error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Quality(e) => Some(e),
            Error::Delivery(e) => Some(e),
            Error::Registry(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<QualityRangeError> for Error {
    fn from(e: QualityRangeError) -> Self {
        Error::Quality(e)
    }
}

impl From<DeliveryError> for Error {
    fn from(e: DeliveryError) -> Self {
        Error::Delivery(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

/// Producer handshake errors
#[derive(Debug)]
pub enum HandshakeError {
    /// A handshake field could not be read from the socket
    Read {
        field: &'static str,
        source: io::Error,
    },
    /// Producer did not finish the handshake in time
    Timeout(Duration),
    /// Stream index was negative
    InvalidStreamIndex(i32),
    /// Stream type tag has no codec
    UnknownStreamType(i32),
    /// Quality index is not in the quality table
    UnknownQuality(i32),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::Read { field, source } => {
                write!(f, "failed to read {}: {}", field, source)
            }
            HandshakeError::Timeout(after) => {
                write!(f, "handshake not completed within {:?}", after)
            }
            HandshakeError::InvalidStreamIndex(index) => {
                write!(f, "invalid stream index {}", index)
            }
            HandshakeError::UnknownStreamType(tag) => write!(f, "unknown stream type tag {}", tag),
            HandshakeError::UnknownQuality(index) => write!(f, "unknown quality index {}", index),
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandshakeError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Length-prefixed frame errors
#[derive(Debug)]
pub enum ProtocolError {
    /// Negative length prefix
    InvalidFrameLength(i32),
    /// Length prefix above the configured maximum
    FrameTooLarge { length: usize, max: usize },
    /// Socket reached EOF in the middle of a frame body
    UnexpectedEof { expected: usize, received: usize },
    /// Socket read failed
    Disconnected(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidFrameLength(len) => write!(f, "invalid frame length {}", len),
            ProtocolError::FrameTooLarge { length, max } => {
                write!(f, "frame of {} bytes exceeds limit of {} bytes", length, max)
            }
            ProtocolError::UnexpectedEof { expected, received } => write!(
                f,
                "connection closed after {} of {} frame bytes",
                received, expected
            ),
            ProtocolError::Disconnected(e) => write!(f, "producer disconnected: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Disconnected(e) => Some(e),
            _ => None,
        }
    }
}

/// Requested quality step falls outside the quality table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityRangeError {
    /// Already at the highest quality
    AboveHighest,
    /// Already at the lowest quality
    BelowLowest,
}

impl fmt::Display for QualityRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityRangeError::AboveHighest => write!(f, "no quality above the highest"),
            QualityRangeError::BelowLowest => write!(f, "no quality below the lowest"),
        }
    }
}

impl std::error::Error for QualityRangeError {}

/// Viewer delivery errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// No frame became available within the idle timeout
    IdleTimeout(Duration),
    /// Client went away (response body dropped, socket closed, write failed)
    ClientGone,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::IdleTimeout(after) => write!(f, "no frame delivered for {:?}", after),
            DeliveryError::ClientGone => write!(f, "client disconnected"),
        }
    }
}

impl std::error::Error for DeliveryError {}
