//! Throughput and delivery statistics

pub mod metrics;

pub use metrics::{DeliveryStats, ThroughputSample, ThroughputSampler};
