//! Configuration for shared streams.

use crate::error::ConfigError;

/// What to do with a new value when the buffer is full and the slowest
/// subscriber is blocking progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Suspend the emitter until a subscriber frees buffer space.
    #[default]
    Suspend,
    /// Drop the oldest buffered value; slow subscribers skip it.
    DropOldest,
    /// Drop the incoming value.
    DropLatest,
}

/// Configuration for a shared stream.
///
/// `replay` values are retained for late subscribers; `extra_buffer` adds
/// room for values that fast producers emit while slow subscribers catch up.
/// A total capacity of zero puts the stream into rendezvous mode, where each
/// value is handed directly from a suspended producer to a subscriber.
#[derive(Debug, Clone, Copy)]
pub struct SharedConfig {
    /// Number of most recent values replayed to a new subscriber.
    pub replay: usize,
    /// Buffer capacity on top of the replay window.
    pub extra_buffer: usize,
    /// Behavior when the buffer is full.
    pub overflow: OverflowPolicy,
}

impl SharedConfig {
    /// Creates a configuration with the given replay capacity, no extra
    /// buffering and the suspending overflow policy.
    pub fn new(replay: usize) -> Self {
        Self {
            replay,
            extra_buffer: 0,
            overflow: OverflowPolicy::Suspend,
        }
    }

    /// Sets the extra buffer capacity.
    pub fn with_extra_buffer(mut self, extra_buffer: usize) -> Self {
        self.extra_buffer = extra_buffer;
        self
    }

    /// Sets the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Total buffer capacity, saturating on overflow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.replay.saturating_add(self.extra_buffer)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overflow != OverflowPolicy::Suspend && self.capacity() == 0 {
            return Err(ConfigError::ZeroCapacityOverflow);
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_saturates() {
        let config = SharedConfig::new(usize::MAX).with_extra_buffer(2);
        assert_eq!(config.capacity(), usize::MAX);
    }

    #[test]
    fn test_zero_capacity_requires_suspend() {
        assert!(SharedConfig::new(0).validate().is_ok());
        assert_eq!(
            SharedConfig::new(0)
                .with_overflow(OverflowPolicy::DropOldest)
                .validate(),
            Err(ConfigError::ZeroCapacityOverflow)
        );
        assert!(SharedConfig::new(1)
            .with_overflow(OverflowPolicy::DropLatest)
            .validate()
            .is_ok());
    }
}
