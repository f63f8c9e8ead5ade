//! Reconnection backoff policy.
//!
//! Delays double after every scheduled retry and are capped at
//! [`MAX_BACKOFF`]. Only a successful open resets the delay.

use std::time::Duration;

/// First reconnect delay, and the value restored after a successful open.
pub const MIN_BACKOFF: Duration = Duration::from_millis(5_000);

/// Ceiling for the reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(60_000);

/// Exponential backoff state for the reconnect timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(MIN_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    /// Create a backoff starting at `min`, never exceeding `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
        }
    }

    /// Delay the next scheduled reconnect will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for the retry being scheduled now and grow the
    /// interval for the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Restore the initial delay. Called on a successful open only.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence_doubles_then_caps() {
        let mut backoff = Backoff::default();
        let delays: Vec<u128> = (0..7).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(
            delays,
            vec![5_000, 10_000, 20_000, 40_000, 60_000, 60_000, 60_000]
        );
    }

    #[test]
    fn test_reset_restores_minimum() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_millis(20_000));

        backoff.reset();
        assert_eq!(backoff.current(), MIN_BACKOFF);
        assert_eq!(backoff.next_delay(), MIN_BACKOFF);
    }

    #[test]
    fn test_max_below_min_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }
}
