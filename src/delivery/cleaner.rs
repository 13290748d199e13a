//! Latest-frame cell
//!
//! Sits between a viewer's outbound channel and a slow network write. A
//! background task keeps moving frames into a single `watch` slot, so the
//! writer always picks up the freshest frame and anything older that
//! arrived during the write is simply overwritten.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::channel::FrameReceiver;
use crate::registry::Frame;

/// Single-slot holder of the most recent frame
pub struct LatestFrame {
    rx: watch::Receiver<Option<Frame>>,
    task: JoinHandle<()>,
}

impl LatestFrame {
    /// Start draining `input` into the cell
    ///
    /// The cell closes once `input` is closed and drained.
    pub fn spawn(mut input: FrameReceiver<Frame>) -> Self {
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = input.recv() => match frame {
                        Some(frame) => {
                            tx.send_replace(Some(frame));
                        }
                        None => break,
                    },
                    _ = tx.closed() => break,
                }
            }
        });

        Self { rx, task }
    }

    /// Wait for a frame newer than the last one returned
    ///
    /// Returns `None` once the input has closed and the last frame was taken.
    pub async fn next(&mut self) -> Option<Frame> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

impl Drop for LatestFrame {
    fn drop(&mut self) {
        self.task.abort();
    }
}
