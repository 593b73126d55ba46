//! Relay engine configuration

use std::time::Duration;

use crate::error::ConfigError;
use crate::multipart::{is_valid_boundary, DEFAULT_BOUNDARY};

/// Configuration for the relay engine and its watchdog
///
/// Stall detection and restart cooldown are expressed as durations and
/// converted to whole watchdog ticks, so changing the tick interval keeps
/// the roughly 1s detection / 10s cooldown ratio.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Watchdog tick interval
    pub tick_interval: Duration,

    /// Time without a boundary marker before the upstream is restarted
    pub stall_timeout: Duration,

    /// Grace period after a restart before another restart can trigger
    pub restart_cooldown: Duration,

    /// Queued chunks per consumer before it is considered too slow
    pub consumer_queue_capacity: usize,

    /// Boundary used until the upstream announces its own
    pub default_boundary: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(240),
            stall_timeout: Duration::from_millis(1000),
            restart_cooldown: Duration::from_millis(10_000),
            consumer_queue_capacity: 256,
            default_boundary: DEFAULT_BOUNDARY.to_string(),
        }
    }
}

impl RelayConfig {
    /// Set the watchdog tick interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the stall timeout
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the restart cooldown
    pub fn restart_cooldown(mut self, cooldown: Duration) -> Self {
        self.restart_cooldown = cooldown;
        self
    }

    /// Set the per-consumer queue capacity
    pub fn consumer_queue_capacity(mut self, capacity: usize) -> Self {
        self.consumer_queue_capacity = capacity.max(1);
        self
    }

    /// Set the boundary assumed before the upstream announces one
    pub fn default_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.default_boundary = boundary.into();
        self
    }

    /// Number of ticks without a boundary that may elapse before a restart
    ///
    /// A restart fires once the stall counter goes strictly above this.
    pub fn stall_ticks(&self) -> i64 {
        let interval = self.tick_interval.as_millis().max(1);
        (self.stall_timeout.as_millis() / interval) as i64
    }

    /// Number of ticks the stall counter is pushed below zero after a restart
    pub fn cooldown_ticks(&self) -> i64 {
        let interval = self.tick_interval.as_millis().max(1);
        self.restart_cooldown.as_millis().div_ceil(interval) as i64
    }

    /// Reject settings the watchdog or the response headers cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() || self.tick_interval > self.stall_timeout {
            return Err(ConfigError::InvalidTickInterval(self.tick_interval));
        }
        if !is_valid_boundary(&self.default_boundary) {
            return Err(ConfigError::InvalidDefaultBoundary(
                self.default_boundary.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.tick_interval, Duration::from_millis(240));
        assert_eq!(config.default_boundary, "ipcamera");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_tick_ratios() {
        let config = RelayConfig::default();

        // 1000 / 240 = 4.17, so the fifth silent tick restarts
        assert_eq!(config.stall_ticks(), 4);
        // 10000 / 240 = 41.67, rounded up
        assert_eq!(config.cooldown_ticks(), 42);
    }

    #[test]
    fn test_ratios_follow_interval() {
        let config = RelayConfig::default().tick_interval(Duration::from_millis(100));

        assert_eq!(config.stall_ticks(), 10);
        assert_eq!(config.cooldown_ticks(), 100);
    }

    #[test]
    fn test_invalid_tick_interval() {
        let zero = RelayConfig::default().tick_interval(Duration::ZERO);
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidTickInterval(_))
        ));

        let too_long = RelayConfig::default().tick_interval(Duration::from_secs(5));
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_invalid_default_boundary() {
        let empty = RelayConfig::default().default_boundary("");
        assert!(matches!(
            empty.validate(),
            Err(ConfigError::InvalidDefaultBoundary(_))
        ));

        let header_break = RelayConfig::default().default_boundary("frame\r\nX-Injected: 1");
        assert!(header_break.validate().is_err());

        assert!(RelayConfig::default().default_boundary("frame").validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .stall_timeout(Duration::from_secs(2))
            .restart_cooldown(Duration::from_secs(5))
            .consumer_queue_capacity(0)
            .default_boundary("frame");

        assert_eq!(config.stall_timeout, Duration::from_secs(2));
        assert_eq!(config.restart_cooldown, Duration::from_secs(5));
        assert_eq!(config.consumer_queue_capacity, 1);
        assert_eq!(config.default_boundary, "frame");
    }
}
