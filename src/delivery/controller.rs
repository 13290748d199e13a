//! Adaptive quality control
//!
//! Each delivery loop measures how fast it actually gets frames out to its
//! client. Averaged over a window, a rate under the floor asks for a lower
//! quality right away; a rate over the ceiling has to persist for several
//! windows in a row before a higher quality is asked for.

use std::time::Duration;

use tokio::time::Instant;

/// Quality controller thresholds
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Measurement window
    pub window: Duration,
    /// Below this delivered rate the viewer is moved down a quality
    pub min_fps: f64,
    /// Above this delivered rate the viewer is a candidate for a raise
    pub max_fps: f64,
    /// Consecutive over-ceiling windows needed for one raise
    pub raise_after: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            min_fps: 8.0,
            max_fps: 29.0,
            raise_after: 5,
        }
    }
}

impl ControllerConfig {
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn min_fps(mut self, fps: f64) -> Self {
        self.min_fps = fps;
        self
    }

    pub fn max_fps(mut self, fps: f64) -> Self {
        self.max_fps = fps;
        self
    }

    /// Set the number of over-ceiling windows needed for a raise (minimum 1)
    pub fn raise_after(mut self, windows: u32) -> Self {
        self.raise_after = windows.max(1);
        self
    }
}

/// Quality change the controller asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityAdjustment {
    Lower,
    Raise,
}

/// Rolling-window frame rate tracker with raise hysteresis
#[derive(Debug)]
pub struct QualityController {
    config: ControllerConfig,
    window_start: Instant,
    frames: u64,
    over_ceiling: u32,
    last_fps: Option<f64>,
}

impl QualityController {
    pub fn new(config: ControllerConfig, now: Instant) -> Self {
        Self {
            config,
            window_start: now,
            frames: 0,
            over_ceiling: 0,
            last_fps: None,
        }
    }

    /// Count one delivered frame
    ///
    /// Returns an adjustment when this frame closes a window whose rate calls
    /// for one.
    pub fn record_frame(&mut self, now: Instant) -> Option<QualityAdjustment> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.config.window || elapsed.is_zero() {
            return None;
        }

        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.last_fps = Some(fps);
        self.frames = 0;
        self.window_start = now;

        if fps < self.config.min_fps {
            self.over_ceiling = 0;
            Some(QualityAdjustment::Lower)
        } else if fps > self.config.max_fps {
            self.over_ceiling += 1;
            if self.over_ceiling >= self.config.raise_after {
                self.over_ceiling = 0;
                Some(QualityAdjustment::Raise)
            } else {
                None
            }
        } else {
            self.over_ceiling = 0;
            None
        }
    }

    /// Delivered rate of the last completed window
    pub fn last_fps(&self) -> Option<f64> {
        self.last_fps
    }

    /// Consecutive over-ceiling windows so far
    pub fn over_ceiling_windows(&self) -> u32 {
        self.over_ceiling
    }
}
