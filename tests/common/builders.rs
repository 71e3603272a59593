//! Test data builders for creating test objects

use fifo_readout::ReadoutConfig;
use std::time::Duration;

/// Builder for fast-cadence test configs
pub struct ConfigBuilder {
    config: ReadoutConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReadoutConfig::default()
                .with_readout_interval(Duration::from_millis(5))
                .with_watchdog_interval(Duration::from_millis(10))
                .with_write_interval(Duration::from_millis(20)),
        }
    }

    pub fn write_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_write_interval(interval);
        self
    }

    pub fn rate_window(mut self, window: Duration) -> Self {
        self.config = self.config.with_rate_window(window);
        self
    }

    pub fn fill_buffer(mut self) -> Self {
        self.config = self.config.with_fill_buffer(true);
        self
    }

    pub fn build(self) -> ReadoutConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .write_interval(Duration::ZERO)
            .fill_buffer()
            .build();

        assert_eq!(config.readout_interval(), Duration::from_millis(5));
        assert_eq!(config.write_interval(), Duration::ZERO);
        assert!(config.fill_buffer);
        assert!(config.validate().is_ok());
    }
}
