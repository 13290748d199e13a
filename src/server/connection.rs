//! Per-producer connection handling
//!
//! Each accepted producer socket runs in its own task:
//!
//! ```text
//! handshake ──► register (stream, quality) ──► pump frames ──► unregister
//!   (timeout)        (may be refused)        (until EOS/error)
//! ```
//!
//! The sending half of the quality's frame channel lives only as long as this
//! task, so when the socket ends, for whatever reason, the channel closes and
//! the broadcast side sees the feed as exhausted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::channel::{FrameSender, SendOutcome};
use crate::error::{HandshakeError, Result};
use crate::media::Quality;
use crate::protocol::{FrameReader, Handshake};
use crate::registry::{Frame, StreamId, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::stats::ThroughputSampler;

/// How a producer connection ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Producer sent the zero-length end-of-stream marker
    EndOfStream,
    /// The consuming side of the frame channel went away
    ChannelClosed,
}

/// A single producer connection
pub struct ProducerConnection<S> {
    producer_id: u64,
    socket: S,
    peer_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
}

impl<S> ProducerConnection<S>
where
    S: AsyncRead + Unpin + Send,
{
    pub fn new(
        producer_id: u64,
        socket: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<StreamRegistry>,
    ) -> Self {
        Self {
            producer_id,
            socket,
            peer_addr,
            config,
            registry,
        }
    }

    /// Run the connection to completion
    pub async fn run(mut self) -> Result<ProducerExit> {
        let timeout = self.config.handshake_timeout;
        let handshake = match tokio::time::timeout(timeout, Handshake::read(&mut self.socket)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(HandshakeError::Timeout(timeout).into()),
        };

        let id = StreamId::from_index(&self.config.stream_prefix, handshake.stream_index);

        tracing::debug!(
            producer_id = self.producer_id,
            peer = %self.peer_addr,
            stream = %id,
            stream_type = %handshake.stream_type,
            quality = %handshake.quality,
            "Handshake complete"
        );

        let tx = self.registry.register_producer(
            &id,
            handshake.stream_type,
            handshake.quality,
            self.producer_id,
        )?;

        let producer_id = self.producer_id;
        let registry = Arc::clone(&self.registry);
        let result = self.pump(&id, handshake, tx).await;
        registry.unregister_producer(&id, handshake.quality, producer_id);

        result
    }

    /// Read frames until end of stream, decoding and forwarding each one
    async fn pump(
        self,
        id: &StreamId,
        handshake: Handshake,
        tx: FrameSender<Frame>,
    ) -> Result<ProducerExit> {
        let quality = handshake.quality;
        let mut reader = FrameReader::new(self.socket)
            .chunk_size(self.config.read_chunk_size)
            .max_frame_size(self.config.max_frame_size);
        let mut codec = handshake.stream_type.codec(self.config.max_frame_size);
        let mut forwarder = Forwarder {
            tx,
            quality,
            sequence: 0,
        };
        let mut sampler = ThroughputSampler::new(self.config.stats_interval);
        let mut units = Vec::new();

        let exit = loop {
            let payload = match reader.next_frame().await {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    codec.finish(&mut units);
                    forwarder.forward(&mut units);
                    tracing::info!(
                        stream = %id,
                        quality = %quality,
                        producer_id = self.producer_id,
                        "Producer ended stream"
                    );
                    break ProducerExit::EndOfStream;
                }
                Err(e) => {
                    tracing::warn!(
                        stream = %id,
                        quality = %quality,
                        producer_id = self.producer_id,
                        peer = %self.peer_addr,
                        error = %e,
                        "Producer disconnected unexpectedly"
                    );
                    log_totals(id, &forwarder, &sampler);
                    return Err(e.into());
                }
            };

            sampler.record(payload.len());
            codec.decode(payload, &mut units);
            if !forwarder.forward(&mut units) {
                tracing::debug!(
                    stream = %id,
                    quality = %quality,
                    producer_id = self.producer_id,
                    "Frame channel closed by consumer"
                );
                break ProducerExit::ChannelClosed;
            }

            if let Some(sample) = sampler.sample(Instant::now()) {
                tracing::info!(
                    stream = %id,
                    quality = %quality,
                    fps = sample.fps,
                    mbps = sample.mbps,
                    dropped = forwarder.tx.dropped(),
                    "Producer throughput"
                );
            }
        };

        log_totals(id, &forwarder, &sampler);
        Ok(exit)
    }
}

fn log_totals(id: &StreamId, forwarder: &Forwarder, sampler: &ThroughputSampler) {
    tracing::debug!(
        stream = %id,
        quality = %forwarder.quality,
        payloads = sampler.total_frames(),
        bytes = sampler.total_bytes(),
        frames = forwarder.sequence,
        dropped = forwarder.tx.dropped(),
        "Producer totals"
    );
}

/// Stamps decoded units with a sequence number and sends them on
struct Forwarder {
    tx: FrameSender<Frame>,
    quality: Quality,
    sequence: u64,
}

impl Forwarder {
    /// Send every pending unit; returns false once the channel is closed
    fn forward(&mut self, units: &mut Vec<Bytes>) -> bool {
        for data in units.drain(..) {
            self.sequence += 1;
            let frame = Frame::new(self.quality, self.sequence, data);
            match self.tx.send(frame) {
                SendOutcome::Queued => {}
                SendOutcome::DroppedOldest => {
                    tracing::trace!(
                        quality = %self.quality,
                        sequence = self.sequence,
                        "Ingest channel full, dropped oldest frame"
                    );
                }
                SendOutcome::Closed => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::error::{Error, ProtocolError};
    use crate::media::StreamType;
    use crate::protocol::{encode_end_of_stream, encode_frame};
    use crate::registry::{RegistryError, StreamConnection};

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50000))
    }

    fn spawn_connection(
        registry: &Arc<StreamRegistry>,
        producer_id: u64,
        config: ServerConfig,
    ) -> (DuplexStream, tokio::task::JoinHandle<Result<ProducerExit>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let connection =
            ProducerConnection::new(producer_id, server, peer(), config, Arc::clone(registry));
        (client, tokio::spawn(connection.run()))
    }

    async fn wait_for_stream(registry: &StreamRegistry, id: &StreamId) {
        for _ in 0..100 {
            if registry.has_active_stream(id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("stream {} never registered", id);
    }

    #[tokio::test]
    async fn test_mjpeg_frames_forwarded_in_order() {
        let registry = Arc::new(StreamRegistry::new());
        let (mut client, handle) = spawn_connection(&registry, 1, ServerConfig::default());

        let handshake = Handshake::from_fields(0, 0, 1).unwrap();
        client.write_all(&handshake.encode()).await.unwrap();

        let id = StreamId::new("stream0");
        wait_for_stream(&registry, &id).await;
        let mut rx = registry.get(&id).unwrap().output_channel(Quality::High).unwrap();

        client.write_all(&encode_frame(b"jpeg-1")).await.unwrap();
        client.write_all(&encode_frame(b"jpeg-2")).await.unwrap();
        client.write_all(&encode_end_of_stream()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.sequence, &first.data[..]), (1, &b"jpeg-1"[..]));
        assert_eq!((second.sequence, &second.data[..]), (2, &b"jpeg-2"[..]));
        assert_eq!(first.quality, Quality::High);
        assert!(rx.recv().await.is_none());

        assert_eq!(handle.await.unwrap().unwrap(), ProducerExit::EndOfStream);
        assert!(!registry.has_active_stream(&id));
    }

    #[tokio::test]
    async fn test_h264_units_flushed_on_end_of_stream() {
        let registry = Arc::new(StreamRegistry::new());
        let (mut client, handle) = spawn_connection(&registry, 1, ServerConfig::default());

        let handshake = Handshake::from_fields(1, 1, 0).unwrap();
        client.write_all(&handshake.encode()).await.unwrap();

        let id = StreamId::new("stream1");
        wait_for_stream(&registry, &id).await;
        let stream = registry.get(&id).unwrap();
        assert_eq!(stream.stream_type(), StreamType::H264);
        let mut rx = stream.output_channel(Quality::Low).unwrap();

        // Start code of the second unit split across two payloads
        client
            .write_all(&encode_frame(&[0, 0, 0, 1, 0x65, 0xAA, 0, 0]))
            .await
            .unwrap();
        client
            .write_all(&encode_frame(&[0, 1, 0x41, 0xBB]))
            .await
            .unwrap();
        client.write_all(&encode_end_of_stream()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(&first.data[..], &[0, 0, 0, 1, 0x65, 0xAA]);
        assert_eq!(&second.data[..], &[0, 0, 0, 1, 0x41, 0xBB]);
        assert!(rx.recv().await.is_none());

        assert_eq!(handle.await.unwrap().unwrap(), ProducerExit::EndOfStream);
    }

    #[tokio::test]
    async fn test_unexpected_disconnect_closes_channel() {
        let registry = Arc::new(StreamRegistry::new());
        let (mut client, handle) = spawn_connection(&registry, 1, ServerConfig::default());

        let handshake = Handshake::from_fields(2, 1, 0).unwrap();
        client.write_all(&handshake.encode()).await.unwrap();

        let id = StreamId::new("stream2");
        wait_for_stream(&registry, &id).await;
        let mut rx = registry.get(&id).unwrap().output_channel(Quality::Low).unwrap();

        client
            .write_all(&encode_frame(&[0, 0, 0, 1, 0x65, 0, 0, 0, 1, 0x41]))
            .await
            .unwrap();
        // Length prefix promising more than is ever sent
        client.write_all(&100i32.to_le_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);

        // Only the unit confirmed by a following start code is delivered
        assert_eq!(&rx.recv().await.unwrap().data[..], &[0, 0, 0, 1, 0x65]);
        assert!(rx.recv().await.is_none());

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnexpectedEof { expected: 100, .. })
        ));
        assert!(!registry.has_active_stream(&id));
    }

    #[tokio::test]
    async fn test_duplicate_quality_refused() {
        let registry = Arc::new(StreamRegistry::new());
        let (mut first, _first_handle) = spawn_connection(&registry, 1, ServerConfig::default());
        let handshake = Handshake::from_fields(0, 0, 0).unwrap();
        first.write_all(&handshake.encode()).await.unwrap();
        wait_for_stream(&registry, &StreamId::new("stream0")).await;

        let (mut second, second_handle) = spawn_connection(&registry, 2, ServerConfig::default());
        second.write_all(&handshake.encode()).await.unwrap();

        let err = second_handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Registry(RegistryError::QualityAlreadyLive(_, Quality::Low))
        ));
        // The first producer is unaffected
        assert_eq!(registry.producer_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_handshake() {
        let registry = Arc::new(StreamRegistry::new());
        let (mut client, handle) = spawn_connection(&registry, 1, ServerConfig::default());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&9i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        client.write_all(&bytes).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::UnknownStreamType(9))
        ));
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let registry = Arc::new(StreamRegistry::new());
        let config = ServerConfig::default().handshake_timeout(Duration::from_secs(10));
        let (mut client, handle) = spawn_connection(&registry, 1, config);

        // Half a handshake, then silence
        client.write_all(&0i32.to_le_bytes()).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::Timeout(d)) if d == Duration::from_secs(10)
        ));
    }
}
