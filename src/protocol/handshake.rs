//! Producer registration handshake
//!
//! The first 12 bytes of a producer connection name the stream it feeds, the
//! codec of its payloads and the quality tier it encodes at. There is no
//! reply; the producer starts sending frames right away.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::HandshakeError;
use crate::media::{Quality, StreamType};
use crate::protocol::constants::HANDSHAKE_SIZE;

/// Decoded producer handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub stream_index: u32,
    pub stream_type: StreamType,
    pub quality: Quality,
}

impl Handshake {
    /// Read and validate the three handshake fields
    pub async fn read<R>(reader: &mut R) -> Result<Self, HandshakeError>
    where
        R: AsyncRead + Unpin,
    {
        let stream_index = read_field(reader, "stream index").await?;
        let stream_type = read_field(reader, "stream type").await?;
        let quality = read_field(reader, "quality index").await?;

        Self::from_fields(stream_index, stream_type, quality)
    }

    /// Validate raw handshake fields
    pub fn from_fields(
        stream_index: i32,
        stream_type: i32,
        quality: i32,
    ) -> Result<Self, HandshakeError> {
        let stream_index = u32::try_from(stream_index)
            .map_err(|_| HandshakeError::InvalidStreamIndex(stream_index))?;
        let stream_type =
            StreamType::from_tag(stream_type).ok_or(HandshakeError::UnknownStreamType(stream_type))?;
        let quality = Quality::from_index(quality).ok_or(HandshakeError::UnknownQuality(quality))?;

        Ok(Self {
            stream_index,
            stream_type,
            quality,
        })
    }

    /// Wire form of the handshake, as a producer sends it
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_SIZE);
        buf.put_i32_le(self.stream_index as i32);
        buf.put_i32_le(self.stream_type.tag());
        buf.put_i32_le(i32::from(self.quality.index()));
        buf.freeze()
    }
}

async fn read_field<R>(reader: &mut R, field: &'static str) -> Result<i32, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    reader
        .read_i32_le()
        .await
        .map_err(|source| HandshakeError::Read { field, source })
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    fn fields(stream: i32, stream_type: i32, quality: i32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_SIZE);
        buf.extend_from_slice(&stream.to_le_bytes());
        buf.extend_from_slice(&stream_type.to_le_bytes());
        buf.extend_from_slice(&quality.to_le_bytes());
        buf
    }

    #[tokio::test]
    async fn test_read_handshake() {
        let mut mock = Builder::new().read(&fields(3, 1, 0)).build();

        let handshake = Handshake::read(&mut mock).await.unwrap();
        assert_eq!(handshake.stream_index, 3);
        assert_eq!(handshake.stream_type, StreamType::H264);
        assert_eq!(handshake.quality, Quality::Low);
    }

    #[tokio::test]
    async fn test_read_handshake_partial_reads() {
        let bytes = fields(7, 0, 1);
        let mut mock = Builder::new()
            .read(&bytes[..1])
            .read(&bytes[1..6])
            .read(&bytes[6..11])
            .read(&bytes[11..])
            .build();

        let handshake = Handshake::read(&mut mock).await.unwrap();
        assert_eq!(handshake.stream_index, 7);
        assert_eq!(handshake.stream_type, StreamType::Mjpeg);
        assert_eq!(handshake.quality, Quality::High);
    }

    #[tokio::test]
    async fn test_truncated_handshake() {
        let bytes = fields(0, 0, 0);
        let mut mock = Builder::new().read(&bytes[..6]).build();

        let err = Handshake::read(&mut mock).await.unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::Read {
                field: "stream type",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_quality() {
        let mut mock = Builder::new().read(&fields(0, 0, 2)).build();

        let err = Handshake::read(&mut mock).await.unwrap_err();
        assert!(matches!(err, HandshakeError::UnknownQuality(2)));
    }

    #[test]
    fn test_invalid_fields() {
        assert!(matches!(
            Handshake::from_fields(-1, 0, 0),
            Err(HandshakeError::InvalidStreamIndex(-1))
        ));
        assert!(matches!(
            Handshake::from_fields(0, 5, 0),
            Err(HandshakeError::UnknownStreamType(5))
        ));
        assert!(matches!(
            Handshake::from_fields(0, 0, -1),
            Err(HandshakeError::UnknownQuality(-1))
        ));
    }

    #[test]
    fn test_encode() {
        let handshake = Handshake::from_fields(2, 1, 1).unwrap();
        assert_eq!(handshake.encode(), fields(2, 1, 1));
    }
}
