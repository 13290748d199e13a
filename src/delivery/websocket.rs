//! H.264 over WebSocket
//!
//! Every NAL unit goes out as one binary message. The read half of the
//! socket is only watched for the client leaving.

use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::broadcast::Viewer;
use crate::error::DeliveryError;
use crate::registry::Frame;

use super::session::FrameSink;

/// Write half of a viewer's WebSocket
pub struct WebSocketSink<S> {
    inner: S,
    closed: bool,
}

impl<S> WebSocketSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> FrameSink for WebSocketSink<S>
where
    S: Sink<Message> + Unpin + Send,
{
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), DeliveryError> {
        if self.closed {
            return Err(DeliveryError::ClientGone);
        }
        self.inner
            .send(Message::Binary(frame.data.clone()))
            .await
            .map_err(|_| DeliveryError::ClientGone)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Client may already be gone
        let _ = self.inner.send(Message::Close(None)).await;
        let _ = self.inner.close().await;
    }
}

/// Watch the read half and mark the viewer done once the client leaves
///
/// Anything the client sends besides a close is ignored.
pub fn watch_client<R, E>(mut incoming: R, viewer: Arc<Viewer>) -> JoinHandle<()>
where
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match incoming.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(viewer_id = viewer.id(), error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
        tracing::debug!(viewer_id = viewer.id(), "WebSocket client left");
        viewer.mark_done();
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;

    use super::*;
    use crate::channel;
    use crate::media::Quality;
    use crate::registry::StreamId;

    fn viewer() -> (Arc<Viewer>, channel::FrameReceiver<Frame>) {
        let (tx, rx) = channel::channel(4);
        let viewer = Viewer::new(7, StreamId::new("stream1"), None, Quality::High, tx);
        (Arc::new(viewer), rx)
    }

    #[tokio::test]
    async fn test_frames_become_binary_messages() {
        let mut sink = WebSocketSink::new(Vec::<Message>::new());

        let nal = Bytes::from_static(&[0, 0, 0, 1, 0x65, 0xAA]);
        sink.write_frame(&Frame::new(Quality::High, 1, nal.clone()))
            .await
            .unwrap();
        sink.close().await;

        // Writes after close are refused
        assert!(sink
            .write_frame(&Frame::new(Quality::High, 2, nal.clone()))
            .await
            .is_err());

        let messages = sink.into_inner();
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], Message::Binary(data) if *data == nal));
        assert!(matches!(&messages[1], Message::Close(None)));
    }

    #[tokio::test]
    async fn test_close_message_marks_viewer_done() {
        let (viewer, _rx) = viewer();
        let incoming = stream::iter(vec![
            Ok::<_, axum::Error>(Message::Text("hello".into())),
            Ok(Message::Close(None)),
        ]);

        watch_client(incoming, Arc::clone(&viewer)).await.unwrap();
        assert!(viewer.is_done());
    }

    #[tokio::test]
    async fn test_read_end_marks_viewer_done() {
        let (viewer, mut rx) = viewer();
        let incoming = stream::iter(Vec::<Result<Message, axum::Error>>::new());

        watch_client(incoming, Arc::clone(&viewer)).await.unwrap();
        assert!(viewer.is_done());
        assert!(rx.recv().await.is_none());
    }
}
