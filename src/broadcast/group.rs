//! Per-stream fan-out
//!
//! A `BroadcastGroup` owns the claimed quality feeds of one stream and the
//! list of its viewers. Each iteration takes one frame from every live
//! quality and hands every viewer the frame for the quality it wants.
//!
//! ```text
//!   Low  feed ──┐                      ┌──► viewer A (wants Low)
//!               ├──► {Low: F, High: F} ┼──► viewer B (wants High)
//!   High feed ──┘                      └──► viewer C (wants High)
//! ```
//!
//! A viewer that wants a quality with no live feed gets the lowest quality
//! produced in that iteration, and its desired quality is coerced to match.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::{FrameReceiver, SendOutcome};
use crate::media::Quality;
use crate::registry::{Frame, StreamConnection, StreamId};

use super::viewer::Viewer;

/// Fan-out unit for one stream
pub struct BroadcastGroup {
    stream: Arc<dyn StreamConnection>,
    viewers: Mutex<Vec<Arc<Viewer>>>,
    ended: AtomicBool,
}

impl BroadcastGroup {
    pub fn new(stream: Arc<dyn StreamConnection>) -> Self {
        Self {
            stream,
            viewers: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        self.stream.id()
    }

    /// Whether this group fans out the given stream connection
    pub fn serves(&self, stream: &Arc<dyn StreamConnection>) -> bool {
        Arc::as_ptr(&self.stream) as *const () == Arc::as_ptr(stream) as *const ()
    }

    fn viewers(&self) -> MutexGuard<'_, Vec<Arc<Viewer>>> {
        self.viewers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a viewer; it receives frames from the next iteration on
    pub fn add_viewer(&self, viewer: Arc<Viewer>) {
        self.viewers().push(viewer);
    }

    /// Number of viewers still in the list, done or not
    pub fn viewer_count(&self) -> usize {
        self.viewers().len()
    }

    /// Whether the group has stopped fanning out
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Stop the group: mark it ended and every viewer done
    pub fn mark_all_done(&self) {
        self.ended.store(true, Ordering::Release);
        for viewer in self.viewers().drain(..) {
            viewer.mark_done();
        }
    }

    /// Claim feeds of qualities that came live since the last iteration
    fn claim_feeds(&self, feeds: &mut BTreeMap<Quality, FrameReceiver<Frame>>) {
        for quality in self.stream.qualities() {
            if feeds.contains_key(&quality) {
                continue;
            }
            if let Some(rx) = self.stream.output_channel(quality) {
                tracing::debug!(stream = %self.stream_id(), quality = %quality, "Quality feed claimed");
                feeds.insert(quality, rx);
            }
        }
    }

    /// Fan frames out until every quality feed is exhausted
    pub async fn run(&self) {
        let mut feeds = BTreeMap::new();
        let mut iterations: u64 = 0;

        tracing::info!(stream = %self.stream_id(), "Broadcast group started");

        loop {
            self.claim_feeds(&mut feeds);

            let frames = next_frames(self.stream_id(), &mut feeds).await;
            if frames.is_empty() {
                break;
            }

            self.deliver(&frames);
            iterations += 1;
        }

        self.mark_all_done();
        tracing::info!(
            stream = %self.stream_id(),
            iterations = iterations,
            "Broadcast group ended"
        );
    }

    /// Hand one iteration's frames to every live viewer
    ///
    /// Done viewers are spliced out on the way. Returns the number of viewers
    /// that were sent a frame.
    pub fn deliver(&self, frames: &BTreeMap<Quality, Frame>) -> usize {
        let Some((&lowest, lowest_frame)) = frames.iter().next() else {
            return 0;
        };

        let mut viewers = self.viewers();
        let mut delivered = 0;

        for index in (0..viewers.len()).rev() {
            let viewer = &viewers[index];
            if viewer.is_done() {
                let viewer = viewers.remove(index);
                tracing::info!(
                    stream = %self.stream_id(),
                    viewer_id = viewer.id(),
                    dropped = viewer.dropped(),
                    remaining = viewers.len(),
                    "Viewer left"
                );
                continue;
            }

            let desired = viewer.desired_quality();
            let frame = match frames.get(&desired) {
                Some(frame) => frame,
                None => {
                    tracing::debug!(
                        stream = %self.stream_id(),
                        viewer_id = viewer.id(),
                        wanted = %desired,
                        forced = %lowest,
                        "Quality not live, forcing downgrade"
                    );
                    viewer.coerce_quality(lowest);
                    lowest_frame
                }
            };

            match viewer.deliver(frame.clone()) {
                SendOutcome::Queued => {}
                SendOutcome::DroppedOldest => {
                    tracing::trace!(
                        stream = %self.stream_id(),
                        viewer_id = viewer.id(),
                        "Viewer behind, dropped oldest frame"
                    );
                }
                SendOutcome::Closed => {
                    // Delivery side is gone; spliced out next iteration
                    viewer.mark_done();
                    continue;
                }
            }
            delivered += 1;
        }

        delivered
    }
}

/// Receive one frame from each feed, dropping feeds that have closed
async fn next_frames(
    stream: &StreamId,
    feeds: &mut BTreeMap<Quality, FrameReceiver<Frame>>,
) -> BTreeMap<Quality, Frame> {
    let mut frames = BTreeMap::new();
    let mut closed = Vec::new();

    for (&quality, rx) in feeds.iter_mut() {
        match rx.recv().await {
            Some(frame) => {
                frames.insert(quality, frame);
            }
            None => closed.push(quality),
        }
    }

    for quality in closed {
        if let Some(rx) = feeds.remove(&quality) {
            tracing::debug!(
                stream = %stream,
                quality = %quality,
                dropped = rx.dropped(),
                "Quality feed exhausted"
            );
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::channel::{self, FrameSender, TryRecvError};
    use crate::media::StreamType;
    use crate::registry::{StreamRegistry, StreamSource};

    fn frame(quality: Quality, sequence: u64) -> Frame {
        Frame::new(quality, sequence, Bytes::from(format!("{}-{}", quality, sequence)))
    }

    fn viewer(id: u64, quality: Quality) -> (Arc<Viewer>, channel::FrameReceiver<Frame>) {
        let (tx, rx) = channel::channel(4);
        let viewer = Viewer::new(id, StreamId::new("stream0"), None, quality, tx);
        (Arc::new(viewer), rx)
    }

    fn registry_with(qualities: &[Quality]) -> (Arc<StreamRegistry>, Vec<FrameSender<Frame>>) {
        let registry = Arc::new(StreamRegistry::new());
        let senders = qualities
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                registry
                    .register_producer(&StreamId::new("stream0"), StreamType::Mjpeg, q, i as u64)
                    .unwrap()
            })
            .collect();
        (registry, senders)
    }

    fn group(registry: &StreamRegistry) -> BroadcastGroup {
        BroadcastGroup::new(registry.get_stream(&StreamId::new("stream0")).unwrap())
    }

    #[test]
    fn test_deliver_by_desired_quality() {
        let (registry, _senders) = registry_with(&[Quality::Low]);
        let group = group(&registry);
        let (low, mut low_rx) = viewer(1, Quality::Low);
        let (high, mut high_rx) = viewer(2, Quality::High);
        group.add_viewer(low);
        group.add_viewer(high);

        let frames = BTreeMap::from([
            (Quality::Low, frame(Quality::Low, 1)),
            (Quality::High, frame(Quality::High, 1)),
        ]);
        assert_eq!(group.deliver(&frames), 2);

        assert_eq!(low_rx.try_recv().unwrap().quality, Quality::Low);
        assert_eq!(high_rx.try_recv().unwrap().quality, Quality::High);
    }

    #[test]
    fn test_forced_downgrade() {
        let (registry, _senders) = registry_with(&[Quality::Low]);
        let group = group(&registry);
        let (high, mut rx) = viewer(1, Quality::High);
        group.add_viewer(Arc::clone(&high));

        let frames = BTreeMap::from([(Quality::Low, frame(Quality::Low, 7))]);
        group.deliver(&frames);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.quality, Quality::Low);
        assert_eq!(received.sequence, 7);
        assert_eq!(high.desired_quality(), Quality::Low);
    }

    #[test]
    fn test_done_viewers_spliced_out() {
        let (registry, _senders) = registry_with(&[Quality::Low]);
        let group = group(&registry);
        let viewers: Vec<_> = (0..4).map(|i| viewer(i, Quality::Low)).collect();
        for (viewer, _) in &viewers {
            group.add_viewer(Arc::clone(viewer));
        }

        viewers[1].0.mark_done();
        viewers[3].0.mark_done();

        let frames = BTreeMap::from([(Quality::Low, frame(Quality::Low, 1))]);
        assert_eq!(group.deliver(&frames), 2);
        assert_eq!(group.viewer_count(), 2);

        // Done stays done
        assert!(viewers[1].0.is_done());
        assert!(viewers[3].0.is_done());
    }

    #[test]
    fn test_closed_outbound_marks_viewer_done() {
        let (registry, _senders) = registry_with(&[Quality::Low]);
        let group = group(&registry);
        let (viewer, rx) = viewer(1, Quality::Low);
        group.add_viewer(Arc::clone(&viewer));
        drop(rx);

        let frames = BTreeMap::from([(Quality::Low, frame(Quality::Low, 1))]);
        assert_eq!(group.deliver(&frames), 0);
        assert!(viewer.is_done());

        group.deliver(&frames);
        assert_eq!(group.viewer_count(), 0);
    }

    #[test]
    fn test_mark_all_done() {
        let (registry, _senders) = registry_with(&[Quality::Low]);
        let group = group(&registry);
        let (viewer, mut rx) = viewer(1, Quality::Low);
        group.add_viewer(Arc::clone(&viewer));

        group.mark_all_done();

        assert!(group.is_ended());
        assert!(viewer.is_done());
        assert_eq!(group.viewer_count(), 0);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[tokio::test]
    async fn test_run_preserves_order_per_quality() {
        let (registry, senders) = registry_with(&[Quality::Low, Quality::High]);
        let group = Arc::new(group(&registry));
        let (low, mut low_rx) = viewer(1, Quality::Low);
        let (high, mut high_rx) = viewer(2, Quality::High);
        group.add_viewer(low);
        group.add_viewer(high);

        let runner = tokio::spawn({
            let group = Arc::clone(&group);
            async move { group.run().await }
        });

        for seq in 1..=3 {
            for (tx, quality) in senders.iter().zip([Quality::Low, Quality::High]) {
                tx.send(frame(quality, seq));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(senders);

        let mut low_seen = Vec::new();
        while let Some(frame) = low_rx.recv().await {
            assert_eq!(frame.quality, Quality::Low);
            low_seen.push(frame.sequence);
        }
        let mut high_seen = Vec::new();
        while let Some(frame) = high_rx.recv().await {
            assert_eq!(frame.quality, Quality::High);
            high_seen.push(frame.sequence);
        }

        assert_eq!(low_seen, vec![1, 2, 3]);
        assert_eq!(high_seen, vec![1, 2, 3]);

        runner.await.unwrap();
        assert!(group.is_ended());
    }

    #[tokio::test]
    async fn test_run_picks_up_late_quality() {
        let registry = Arc::new(StreamRegistry::new());
        let id = StreamId::new("stream0");
        let low_tx = registry
            .register_producer(&id, StreamType::Mjpeg, Quality::Low, 1)
            .unwrap();
        let group = Arc::new(group(&registry));
        let (high, mut rx) = viewer(1, Quality::High);
        group.add_viewer(Arc::clone(&high));

        let runner = tokio::spawn({
            let group = Arc::clone(&group);
            async move { group.run().await }
        });

        // Only Low is live: the High viewer is downgraded
        low_tx.send(frame(Quality::Low, 1));
        assert_eq!(rx.recv().await.unwrap().quality, Quality::Low);
        assert_eq!(high.desired_quality(), Quality::Low);

        // High comes live; the group claims it on its next iteration
        let high_tx = registry
            .register_producer(&id, StreamType::Mjpeg, Quality::High, 2)
            .unwrap();
        low_tx.send(frame(Quality::Low, 2));
        assert_eq!(rx.recv().await.unwrap().quality, Quality::Low);

        high.request_quality_change(true).unwrap();
        low_tx.send(frame(Quality::Low, 3));
        high_tx.send(frame(Quality::High, 1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.quality, Quality::High);
        assert_eq!(high.desired_quality(), Quality::High);

        drop(low_tx);
        drop(high_tx);
        runner.await.unwrap();
        assert!(high.is_done());
    }

    #[tokio::test]
    async fn test_run_ends_when_exhausted() {
        let (registry, senders) = registry_with(&[Quality::Low]);
        let group = group(&registry);
        let (viewer, _rx) = viewer(1, Quality::Low);
        group.add_viewer(Arc::clone(&viewer));

        drop(senders);
        group.run().await;

        assert!(viewer.is_done());
        assert!(group.is_ended());
    }
}
