//! Per-viewer broadcast state
//!
//! A `Viewer` is shared between its broadcast group, which pushes frames and
//! may force a downgrade, and the viewer's delivery task, which adjusts the
//! desired quality and ends the viewer. Both sides only touch atomics and the
//! drop-oldest outbound channel, so neither ever waits on the other.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::channel::{FrameSender, SendOutcome};
use crate::error::QualityRangeError;
use crate::media::Quality;
use crate::registry::{Frame, StreamId};

/// One connected client of a stream
#[derive(Debug)]
pub struct Viewer {
    id: u64,
    stream: StreamId,
    peer: Option<SocketAddr>,
    desired: AtomicU8,
    done: AtomicBool,
    outbound: FrameSender<Frame>,
}

impl Viewer {
    pub(crate) fn new(
        id: u64,
        stream: StreamId,
        peer: Option<SocketAddr>,
        quality: Quality,
        outbound: FrameSender<Frame>,
    ) -> Self {
        Self {
            id,
            stream,
            peer,
            desired: AtomicU8::new(quality.index()),
            done: AtomicBool::new(false),
            outbound,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Quality the viewer currently wants
    pub fn desired_quality(&self) -> Quality {
        decode(self.desired.load(Ordering::Acquire))
    }

    /// Step the desired quality up or down by one
    ///
    /// Raising at the highest quality saturates and succeeds. Lowering at the
    /// lowest quality fails; the caller is expected to end the viewer.
    pub fn request_quality_change(&self, higher: bool) -> Result<Quality, QualityRangeError> {
        let mut current = self.desired.load(Ordering::Acquire);
        loop {
            let target = if higher {
                decode(current).next().unwrap_or_else(|_| Quality::highest())
            } else {
                decode(current).prev()?
            };

            match self.desired.compare_exchange_weak(
                current,
                target.index(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(target),
                Err(actual) => current = actual,
            }
        }
    }

    /// Force the desired quality, used when the wanted feed is not live
    pub(crate) fn coerce_quality(&self, quality: Quality) {
        self.desired.store(quality.index(), Ordering::Release);
    }

    /// Mark the viewer done and close its outbound channel
    ///
    /// Idempotent. A done viewer never becomes live again; its group drops
    /// it on the next iteration.
    pub fn mark_done(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.outbound.close();
            tracing::debug!(stream = %self.stream, viewer_id = self.id, "Viewer marked done");
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Queue a frame for delivery without waiting
    pub(crate) fn deliver(&self, frame: Frame) -> SendOutcome {
        self.outbound.send(frame)
    }

    /// Frames dropped from the outbound channel so far
    pub fn dropped(&self) -> u64 {
        self.outbound.dropped()
    }
}

fn decode(index: u8) -> Quality {
    Quality::from_index(i32::from(index)).unwrap_or_else(Quality::lowest)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::channel::{self, TryRecvError};

    fn viewer(quality: Quality) -> (Viewer, channel::FrameReceiver<Frame>) {
        let (tx, rx) = channel::channel(4);
        let viewer = Viewer::new(1, StreamId::new("stream0"), None, quality, tx);
        (viewer, rx)
    }

    #[test]
    fn test_raise_saturates() {
        let (viewer, _rx) = viewer(Quality::Low);

        assert_eq!(viewer.request_quality_change(true), Ok(Quality::High));
        assert_eq!(viewer.request_quality_change(true), Ok(Quality::High));
        assert_eq!(viewer.desired_quality(), Quality::High);
    }

    #[test]
    fn test_lower_below_lowest_fails() {
        let (viewer, _rx) = viewer(Quality::High);

        assert_eq!(viewer.request_quality_change(false), Ok(Quality::Low));
        assert_eq!(
            viewer.request_quality_change(false),
            Err(QualityRangeError::BelowLowest)
        );
        assert_eq!(viewer.desired_quality(), Quality::Low);
    }

    #[test]
    fn test_mark_done_closes_outbound() {
        let (viewer, mut rx) = viewer(Quality::High);
        viewer.deliver(Frame::new(Quality::High, 1, Bytes::from_static(b"x")));

        viewer.mark_done();
        viewer.mark_done();
        assert!(viewer.is_done());

        // Queued frame still drains, then the channel reports closed
        assert!(rx.try_recv().is_ok());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(
            viewer.deliver(Frame::new(Quality::High, 2, Bytes::new())),
            SendOutcome::Closed
        );
    }

    #[test]
    fn test_concurrent_quality_changes() {
        let (viewer, _rx) = viewer(Quality::Low);
        let viewer = Arc::new(viewer);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let viewer = Arc::clone(&viewer);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let _ = viewer.request_quality_change(i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(Quality::ALL.contains(&viewer.desired_quality()));
    }
}
