//! Statistics for producer and viewer connections

use std::time::{Duration, Instant};

/// One throughput measurement over a sampling interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Frames per second
    pub fps: f64,
    /// Megabits per second
    pub mbps: f64,
    /// Length of the interval measured
    pub interval: Duration,
}

/// Periodic frame/byte rate sampler
///
/// Counts frames and bytes and yields a sample once per interval. Used for
/// logging only; nothing in the pipeline reacts to it.
#[derive(Debug, Clone)]
pub struct ThroughputSampler {
    interval: Duration,
    started: Instant,
    frames: u64,
    bytes: u64,
    total_frames: u64,
    total_bytes: u64,
}

impl ThroughputSampler {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// Create a sampler whose first interval begins at `now`
    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            started: now,
            frames: 0,
            bytes: 0,
            total_frames: 0,
            total_bytes: 0,
        }
    }

    /// Count one frame of `bytes` bytes
    pub fn record(&mut self, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
        self.total_frames += 1;
        self.total_bytes += bytes as u64;
    }

    /// Take a sample if the interval has elapsed, starting a new interval
    pub fn sample(&mut self, now: Instant) -> Option<ThroughputSample> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let sample = ThroughputSample {
            fps: self.frames as f64 / secs,
            mbps: (self.bytes * 8) as f64 / secs / 1_000_000.0,
            interval: elapsed,
        };

        self.started = now;
        self.frames = 0;
        self.bytes = 0;
        Some(sample)
    }

    /// Frames counted since creation
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Bytes counted since creation
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Counters for one viewer's delivery session
#[derive(Debug, Clone)]
pub struct DeliveryStats {
    /// When the viewer connected
    pub started_at: Instant,
    /// Frames written to the client
    pub frames: u64,
    /// Payload bytes written to the client
    pub bytes: u64,
    /// Quality raises applied by the controller
    pub raises: u32,
    /// Quality lowerings applied by the controller
    pub lowers: u32,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames: 0,
            bytes: 0,
            raises: 0,
            lowers: 0,
        }
    }

    pub fn record_frame(&mut self, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
    }

    /// Get duration since the viewer connected
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average delivered frame rate over the whole session
    pub fn average_fps(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sample_before_interval() {
        let start = Instant::now();
        let mut sampler = ThroughputSampler::starting_at(Duration::from_secs(10), start);
        sampler.record(1000);

        assert!(sampler.sample(start + Duration::from_secs(9)).is_none());
    }

    #[test]
    fn test_sample_rates() {
        let start = Instant::now();
        let mut sampler = ThroughputSampler::starting_at(Duration::from_secs(10), start);
        for _ in 0..250 {
            sampler.record(125_000);
        }

        let sample = sampler.sample(start + Duration::from_secs(10)).unwrap();
        assert!((sample.fps - 25.0).abs() < 1e-9);
        // 250 * 125 kB * 8 bits over 10 s = 25 Mbit/s
        assert!((sample.mbps - 25.0).abs() < 1e-9);
        assert_eq!(sample.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_sample_resets_interval() {
        let start = Instant::now();
        let mut sampler = ThroughputSampler::starting_at(Duration::from_secs(1), start);
        sampler.record(10);
        sampler.sample(start + Duration::from_secs(1)).unwrap();

        let sample = sampler.sample(start + Duration::from_secs(2)).unwrap();
        assert_eq!(sample.fps, 0.0);
        assert_eq!(sampler.total_frames(), 1);
        assert_eq!(sampler.total_bytes(), 10);
    }

    #[test]
    fn test_delivery_stats() {
        let mut stats = DeliveryStats::new();
        stats.record_frame(100);
        stats.record_frame(50);

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes, 150);
        assert!(stats.average_fps() >= 0.0);
    }
}
