use std::time::Duration;

/// Exponential reconnect schedule: `base * 2^(n-1)` for the n-th consecutive error, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt after `consecutive_errors` failures in a row
    pub fn delay(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return Duration::ZERO;
        }
        let exponent = (consecutive_errors - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
