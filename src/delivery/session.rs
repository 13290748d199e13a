//! Viewer delivery loop
//!
//! Transport-independent part of serving one viewer: wait for the next
//! frame (bounded by the idle timeout), hand it to the transport sink, feed
//! the quality controller and apply what it asks for.
//!
//! ```text
//!   Connecting ──► Streaming ──► Done
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::broadcast::Viewer;
use crate::channel::FrameReceiver;
use crate::error::DeliveryError;
use crate::registry::Frame;
use crate::stats::DeliveryStats;

use super::cleaner::LatestFrame;
use super::controller::{ControllerConfig, QualityAdjustment, QualityController};

/// Delivery configuration
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// End the viewer when no frame could be delivered for this long
    pub idle_timeout: Duration,
    /// Run the quality controller in the delivery loop
    pub quality_control: bool,
    /// Quality controller thresholds
    pub controller: ControllerConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5),
            quality_control: true,
            controller: ControllerConfig::default(),
        }
    }
}

impl DeliveryConfig {
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn quality_control(mut self, enabled: bool) -> Self {
        self.quality_control = enabled;
        self
    }

    pub fn controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = controller;
        self
    }
}

/// Delivery lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    /// Viewer joined, transport not yet streaming
    Connecting,
    /// Frames are being written
    Streaming,
    /// Terminal
    Done,
}

/// Why a delivery loop stopped
#[derive(Debug)]
pub enum DeliveryEnd {
    /// The viewer's frame input closed (stream over or viewer marked done)
    InputClosed,
    /// The quality controller asked to go below the lowest quality
    QualityFloor,
    /// Delivery failed or timed out
    Failed(DeliveryError),
}

/// Transport a delivery loop writes frames to
pub trait FrameSink: Send {
    /// Write one frame to the client
    fn write_frame(
        &mut self,
        frame: &Frame,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Flush and close the transport
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Where a delivery loop takes its frames from
pub enum FrameInput {
    /// Through a latest-frame cell; stale frames are skipped
    Latest(LatestFrame),
    /// Straight from the viewer's outbound channel
    Direct(FrameReceiver<Frame>),
}

impl FrameInput {
    async fn next(&mut self) -> Option<Frame> {
        match self {
            FrameInput::Latest(latest) => latest.next().await,
            FrameInput::Direct(rx) => rx.recv().await,
        }
    }
}

/// One viewer's delivery loop
pub struct DeliverySession<S> {
    viewer: Arc<Viewer>,
    input: FrameInput,
    sink: S,
    config: DeliveryConfig,
    phase: DeliveryPhase,
    stats: DeliveryStats,
}

impl<S: FrameSink> DeliverySession<S> {
    pub fn new(viewer: Arc<Viewer>, input: FrameInput, sink: S, config: DeliveryConfig) -> Self {
        Self {
            viewer,
            input,
            sink,
            config,
            phase: DeliveryPhase::Connecting,
            stats: DeliveryStats::new(),
        }
    }

    pub fn phase(&self) -> DeliveryPhase {
        self.phase
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Deliver frames until the viewer ends
    ///
    /// Always leaves the viewer done and the session in `Done`.
    pub async fn run(&mut self) -> DeliveryEnd {
        if self.phase == DeliveryPhase::Done {
            return DeliveryEnd::InputClosed;
        }
        self.phase = DeliveryPhase::Streaming;

        let end = self.stream().await;

        self.phase = DeliveryPhase::Done;
        self.viewer.mark_done();
        self.sink.close().await;

        tracing::info!(
            stream = %self.viewer.stream(),
            viewer_id = self.viewer.id(),
            frames = self.stats.frames,
            bytes = self.stats.bytes,
            fps = self.stats.average_fps(),
            raises = self.stats.raises,
            lowers = self.stats.lowers,
            end = ?end,
            "Viewer delivery ended"
        );

        end
    }

    async fn stream(&mut self) -> DeliveryEnd {
        let idle = self.config.idle_timeout;
        let mut controller = self
            .config
            .quality_control
            .then(|| QualityController::new(self.config.controller.clone(), Instant::now()));

        loop {
            let frame = match tokio::time::timeout(idle, self.input.next()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return DeliveryEnd::InputClosed,
                Err(_) => {
                    tracing::info!(
                        stream = %self.viewer.stream(),
                        viewer_id = self.viewer.id(),
                        "No frame within idle timeout, viewer unreachable"
                    );
                    return DeliveryEnd::Failed(DeliveryError::IdleTimeout(idle));
                }
            };

            match tokio::time::timeout(idle, self.sink.write_frame(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return DeliveryEnd::Failed(e),
                Err(_) => return DeliveryEnd::Failed(DeliveryError::IdleTimeout(idle)),
            }
            self.stats.record_frame(frame.len());

            let Some(controller) = controller.as_mut() else {
                continue;
            };
            match controller.record_frame(Instant::now()) {
                Some(QualityAdjustment::Lower) => match self.viewer.request_quality_change(false) {
                    Ok(quality) => {
                        self.stats.lowers += 1;
                        tracing::info!(
                            stream = %self.viewer.stream(),
                            viewer_id = self.viewer.id(),
                            fps = controller.last_fps(),
                            quality = %quality,
                            "Poor connectivity, lowering quality"
                        );
                    }
                    Err(e) => {
                        tracing::info!(
                            stream = %self.viewer.stream(),
                            viewer_id = self.viewer.id(),
                            fps = controller.last_fps(),
                            error = %e,
                            "Poor connectivity at lowest quality, removing viewer"
                        );
                        return DeliveryEnd::QualityFloor;
                    }
                },
                Some(QualityAdjustment::Raise) => {
                    let before = self.viewer.desired_quality();
                    if let Ok(quality) = self.viewer.request_quality_change(true) {
                        if quality != before {
                            self.stats.raises += 1;
                            tracing::info!(
                                stream = %self.viewer.stream(),
                                viewer_id = self.viewer.id(),
                                fps = controller.last_fps(),
                                quality = %quality,
                                "Good connectivity, raising quality"
                            );
                        }
                    }
                }
                None => {}
            }
        }
    }
}
