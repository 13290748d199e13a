//! MJPEG over HTTP multipart
//!
//! Each frame goes out as one part of a `multipart/x-mixed-replace` body:
//!
//! ```text
//! --BOUNDARY\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```

use std::io;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::DeliveryError;
use crate::registry::Frame;

use super::session::FrameSink;

/// Part delimiter, including its leading dashes
pub const BOUNDARY: &str = "--BOUNDARY";

/// Value of the response `Content-Type` header
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=--BOUNDARY";

type Chunk = Result<Bytes, io::Error>;

/// Frame one JPEG as a multipart part
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Writes frames into a streaming HTTP response body
///
/// The body channel holds a single part, so a write only completes once the
/// previous part was taken by the HTTP connection.
pub struct MjpegSink {
    tx: Option<mpsc::Sender<Chunk>>,
}

impl MjpegSink {
    /// Create a sink and the response that streams its output
    pub fn new() -> (Self, Response) {
        let (tx, rx) = mpsc::channel::<Chunk>(1);
        let body = Body::from_stream(ReceiverStream::new(rx));
        (Self { tx: Some(tx) }, response(body))
    }
}

impl FrameSink for MjpegSink {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        let tx = self.tx.as_ref().ok_or(DeliveryError::ClientGone)?;
        tx.send(Ok(encode_part(&frame.data)))
            .await
            .map_err(|_| DeliveryError::ClientGone)
    }

    async fn close(&mut self) {
        // Dropping the sender ends the body
        self.tx = None;
    }
}

fn response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(CONTENT_TYPE));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));
    response
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::media::Quality;

    #[test]
    fn test_encode_part() {
        let part = encode_part(b"\xFF\xD8jpeg\xFF\xD9");
        assert_eq!(
            &part[..],
            &b"--BOUNDARY\r\nContent-Type: image/jpeg\r\nContent-Length: 8\r\n\r\n\xFF\xD8jpeg\xFF\xD9\r\n"[..]
        );
    }

    #[test]
    fn test_empty_part() {
        let part = encode_part(b"");
        assert!(part.ends_with(b"Content-Length: 0\r\n\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_response_headers() {
        let (_sink, response) = MjpegSink::new();
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], CONTENT_TYPE);
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
    }

    #[tokio::test]
    async fn test_sink_writes_parts_in_order() {
        let (mut sink, response) = MjpegSink::new();
        let mut body = response.into_body().into_data_stream();

        let writer = tokio::spawn(async move {
            for seq in 1..=3u64 {
                let data = Bytes::from(format!("jpeg{}", seq));
                sink.write_frame(&Frame::new(Quality::Low, seq, data))
                    .await
                    .unwrap();
            }
            sink.close().await;
        });

        let mut parts = Vec::new();
        while let Some(chunk) = body.next().await {
            parts.push(chunk.unwrap());
        }
        writer.await.unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], encode_part(b"jpeg1"));
        assert_eq!(parts[2], encode_part(b"jpeg3"));
    }

    #[tokio::test]
    async fn test_dropped_body_is_client_gone() {
        let (mut sink, response) = MjpegSink::new();
        drop(response);

        let frame = Frame::new(Quality::Low, 1, Bytes::from_static(b"jpeg"));
        assert!(matches!(
            sink.write_frame(&frame).await,
            Err(DeliveryError::ClientGone)
        ));
    }
}
