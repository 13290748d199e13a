//! Broadcaster registry
//!
//! Maps each stream to its running broadcast group. Groups are created
//! lazily when the first viewer of a stream joins and removed when their
//! stream runs out of feeds.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::{self, FrameReceiver};
use crate::media::{Quality, StreamType};
use crate::registry::{Frame, RegistryError, StreamId, StreamSource};

use super::group::BroadcastGroup;
use super::viewer::Viewer;

/// Configuration for viewer fan-out
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Frames buffered per viewer before drop-oldest kicks in
    pub viewer_channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            viewer_channel_capacity: 4,
        }
    }
}

impl BroadcastConfig {
    /// Set the per-viewer outbound channel capacity (minimum 1)
    pub fn viewer_channel_capacity(mut self, capacity: usize) -> Self {
        self.viewer_channel_capacity = capacity.max(1);
        self
    }
}

/// A joined viewer and the receiving end of its outbound channel
pub struct Subscription {
    pub viewer: Arc<Viewer>,
    pub frames: FrameReceiver<Frame>,
    pub stream_type: StreamType,
}

/// Registry of broadcast groups, one per stream with viewers
pub struct Broadcaster {
    source: Arc<dyn StreamSource>,
    groups: Mutex<HashMap<StreamId, Arc<BroadcastGroup>>>,
    next_viewer_id: AtomicU64,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(source: Arc<dyn StreamSource>) -> Self {
        Self::with_config(source, BroadcastConfig::default())
    }

    pub fn with_config(source: Arc<dyn StreamSource>, config: BroadcastConfig) -> Self {
        Self {
            source,
            groups: Mutex::new(HashMap::new()),
            next_viewer_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<StreamId, Arc<BroadcastGroup>>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stream type of a live stream, if it has any producer
    pub fn stream_type(&self, id: &StreamId) -> Option<StreamType> {
        self.source
            .get_stream(id)
            .filter(|stream| stream.is_open())
            .map(|stream| stream.stream_type())
    }

    /// Join a viewer to a stream
    ///
    /// Starts the stream's broadcast group if it isn't running. The initial
    /// desired quality is `quality` if given, otherwise the highest live one.
    /// Must be called from within a tokio runtime.
    pub fn add_viewer(
        self: &Arc<Self>,
        id: &StreamId,
        peer: Option<SocketAddr>,
        quality: Option<Quality>,
    ) -> Result<Subscription, RegistryError> {
        let stream = self
            .source
            .get_stream(id)
            .filter(|stream| stream.is_open())
            .ok_or_else(|| RegistryError::StreamNotFound(id.clone()))?;

        let initial = quality
            .or_else(|| stream.qualities().last().copied())
            .unwrap_or_else(Quality::highest);

        let viewer_id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::channel(self.config.viewer_channel_capacity);
        let viewer = Arc::new(Viewer::new(viewer_id, id.clone(), peer, initial, tx));

        let mut groups = self.groups();
        let group = match groups.get(id) {
            Some(group) if !group.is_ended() && group.serves(&stream) => Arc::clone(group),
            _ => {
                let group = Arc::new(BroadcastGroup::new(Arc::clone(&stream)));
                groups.insert(id.clone(), Arc::clone(&group));
                self.spawn_group(Arc::clone(&group));
                group
            }
        };
        group.add_viewer(Arc::clone(&viewer));
        let viewers = group.viewer_count();
        drop(groups);

        tracing::info!(
            stream = %id,
            viewer_id = viewer_id,
            peer = ?peer,
            quality = %initial,
            viewers = viewers,
            "Viewer joined"
        );

        Ok(Subscription {
            viewer,
            frames: rx,
            stream_type: stream.stream_type(),
        })
    }

    fn spawn_group(self: &Arc<Self>, group: Arc<BroadcastGroup>) {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            group.run().await;
            broadcaster.remove_group(&group);
        });
    }

    /// Drop a finished group from the registry
    ///
    /// Viewers that joined after the group's last iteration are marked done
    /// here, under the registry lock, so none is left attached to a group
    /// that no longer runs.
    fn remove_group(&self, group: &Arc<BroadcastGroup>) {
        let mut groups = self.groups();
        if let Some(current) = groups.get(group.stream_id()) {
            if Arc::ptr_eq(current, group) {
                groups.remove(group.stream_id());
            }
        }
        group.mark_all_done();

        tracing::debug!(stream = %group.stream_id(), groups = groups.len(), "Broadcast group removed");
    }

    /// Number of running broadcast groups
    pub fn group_count(&self) -> usize {
        self.groups().len()
    }

    /// Number of viewers attached to a stream's group
    pub fn viewer_count(&self, id: &StreamId) -> usize {
        self.groups()
            .get(id)
            .map(|group| group.viewer_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::registry::StreamRegistry;

    fn setup() -> (Arc<StreamRegistry>, Arc<Broadcaster>) {
        let registry = Arc::new(StreamRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry) as Arc<dyn StreamSource>
        ));
        (registry, broadcaster)
    }

    #[tokio::test]
    async fn test_unknown_stream() {
        let (_registry, broadcaster) = setup();

        let result = broadcaster.add_viewer(&StreamId::new("stream9"), None, None);
        assert!(matches!(result, Err(RegistryError::StreamNotFound(_))));
        assert_eq!(broadcaster.group_count(), 0);
    }

    #[tokio::test]
    async fn test_default_quality_is_highest_live() {
        let (registry, broadcaster) = setup();
        let id = StreamId::new("stream0");
        let _tx = registry
            .register_producer(&id, StreamType::Mjpeg, Quality::Low, 1)
            .unwrap();

        let sub = broadcaster.add_viewer(&id, None, None).unwrap();
        assert_eq!(sub.viewer.desired_quality(), Quality::Low);
        assert_eq!(sub.stream_type, StreamType::Mjpeg);

        let _high = registry
            .register_producer(&id, StreamType::Mjpeg, Quality::High, 2)
            .unwrap();
        let sub = broadcaster.add_viewer(&id, None, None).unwrap();
        assert_eq!(sub.viewer.desired_quality(), Quality::High);

        let sub = broadcaster
            .add_viewer(&id, None, Some(Quality::Low))
            .unwrap();
        assert_eq!(sub.viewer.desired_quality(), Quality::Low);
    }

    #[tokio::test]
    async fn test_viewers_share_one_group() {
        let (registry, broadcaster) = setup();
        let id = StreamId::new("stream0");
        let tx = registry
            .register_producer(&id, StreamType::Mjpeg, Quality::High, 1)
            .unwrap();

        let mut a = broadcaster.add_viewer(&id, None, None).unwrap();
        let mut b = broadcaster.add_viewer(&id, None, None).unwrap();
        assert_eq!(broadcaster.group_count(), 1);
        assert_eq!(broadcaster.viewer_count(&id), 2);
        assert_ne!(a.viewer.id(), b.viewer.id());

        tx.send(Frame::new(Quality::High, 1, Bytes::from_static(b"frame")));

        let fa = a.frames.recv().await.unwrap();
        let fb = b.frames.recv().await.unwrap();
        assert_eq!(fa.sequence, 1);
        // Both viewers share the same frame allocation
        assert_eq!(fa.data.as_ptr(), fb.data.as_ptr());
    }

    #[tokio::test]
    async fn test_group_removed_when_stream_ends() {
        let (registry, broadcaster) = setup();
        let id = StreamId::new("stream0");
        let tx = registry
            .register_producer(&id, StreamType::Mjpeg, Quality::High, 1)
            .unwrap();

        let mut sub = broadcaster.add_viewer(&id, None, None).unwrap();
        drop(tx);
        registry.unregister_producer(&id, Quality::High, 1);

        assert!(sub.frames.recv().await.is_none());
        assert!(sub.viewer.is_done());

        for _ in 0..100 {
            if broadcaster.group_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broadcaster.group_count(), 0);

        // No producers left: joining is refused
        assert!(broadcaster.add_viewer(&id, None, None).is_err());
    }
}
