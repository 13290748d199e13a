//! Length-prefixed frame reading
//!
//! After the handshake a producer sends `{i32 LE length; payload}` records.
//! A zero length is a graceful end of stream. Bodies are read in bounded
//! chunks so one producer never asks the socket for more than the chunk size
//! at a time, and partial reads are stitched back together.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;
use crate::protocol::constants::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_CHUNK_SIZE, END_OF_STREAM, LENGTH_PREFIX_SIZE,
};

/// Reader of length-prefixed frames
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    chunk_size: usize,
    max_frame_size: usize,
    finished: bool,
    frames: u64,
    bytes: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with default chunk size and frame limit
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            finished: false,
            frames: 0,
            bytes: 0,
        }
    }

    /// Set the largest single read (minimum 1)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the largest accepted frame body
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` once the producer has sent the end-of-stream marker.
    /// After that no further reads are issued on the socket.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.finished {
            return Ok(None);
        }

        let length = self
            .reader
            .read_i32_le()
            .await
            .map_err(ProtocolError::Disconnected)?;

        if length == END_OF_STREAM {
            self.finished = true;
            return Ok(None);
        }

        let length = usize::try_from(length).map_err(|_| ProtocolError::InvalidFrameLength(length))?;
        if length > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                length,
                max: self.max_frame_size,
            });
        }

        let body = self.read_body(length).await?;
        self.frames += 1;
        self.bytes += (LENGTH_PREFIX_SIZE + length) as u64;
        Ok(Some(body))
    }

    async fn read_body(&mut self, length: usize) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::zeroed(length);
        let mut filled = 0;

        while filled < length {
            let end = (filled + self.chunk_size).min(length);
            let n = self
                .reader
                .read(&mut buf[filled..end])
                .await
                .map_err(ProtocolError::Disconnected)?;

            if n == 0 {
                return Err(ProtocolError::UnexpectedEof {
                    expected: length,
                    received: filled,
                });
            }
            filled += n;
        }

        Ok(buf.freeze())
    }

    /// Whether the end-of-stream marker has been read
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frames read so far
    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    /// Bytes consumed by frames so far, prefixes included
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Get a reference to the underlying reader
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Wire form of one frame: length prefix followed by the payload
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_i32_le(payload.len() as i32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Wire form of the end-of-stream marker
pub fn encode_end_of_stream() -> Bytes {
    Bytes::copy_from_slice(&END_OF_STREAM.to_le_bytes())
}
