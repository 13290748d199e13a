//! Registry configuration

/// Configuration for the producer stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames buffered per quality feed before drop-oldest kicks in
    pub frame_channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            frame_channel_capacity: 32,
        }
    }
}

impl RegistryConfig {
    /// Set the per-quality frame channel capacity
    pub fn frame_channel_capacity(mut self, capacity: usize) -> Self {
        self.frame_channel_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(RegistryConfig::default().frame_channel_capacity, 32);
    }

    #[test]
    fn test_capacity_floor() {
        let config = RegistryConfig::default().frame_channel_capacity(0);
        assert_eq!(config.frame_channel_capacity, 1);
    }
}
