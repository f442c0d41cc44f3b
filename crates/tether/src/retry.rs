//! Retry delay strategies.

use std::time::Duration;

/// Decides how long to wait before retry number `attempt` (starting at 0).
pub trait RetryStrategy: Send {
    /// `None` means stop retrying.
    fn delay(&self, attempt: u32) -> Option<Duration>;
}

/// Same delay every time, optionally bounded.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }
}

impl RetryStrategy for FixedDelay {
    fn delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Doubling delay capped at `max`. Never gives up.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Option<Duration> {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_limit() {
        let strategy = FixedDelay::new(Duration::from_millis(150)).with_max_attempts(5);
        assert_eq!(strategy.delay(0), Some(Duration::from_millis(150)));
        assert_eq!(strategy.delay(4), Some(Duration::from_millis(150)));
        assert_eq!(strategy.delay(5), None);
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let strategy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(strategy.delay(0), Some(Duration::from_secs(1)));
        assert_eq!(strategy.delay(1), Some(Duration::from_secs(2)));
        assert_eq!(strategy.delay(2), Some(Duration::from_secs(4)));
        assert_eq!(strategy.delay(3), Some(Duration::from_secs(5)));
        assert_eq!(strategy.delay(100), Some(Duration::from_secs(5)));
    }
}
