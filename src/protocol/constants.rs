//! Producer wire protocol constants

/// Size of one handshake field (little-endian i32)
pub const FIELD_SIZE: usize = 4;

/// Handshake length: stream index, stream type tag, quality index
pub const HANDSHAKE_SIZE: usize = 3 * FIELD_SIZE;

/// Size of the length prefix in front of every frame
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Length prefix announcing a graceful end of stream
pub const END_OF_STREAM: i32 = 0;

/// Largest single socket read while receiving a frame body
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Largest frame body accepted from a producer
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default ingest port
pub const DEFAULT_INGEST_PORT: u16 = 12345;
