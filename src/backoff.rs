use std::time::Duration;

/// Interval after a successful connect
pub const BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Longest wait between reconnect attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

const BACKOFF_FACTOR: f64 = 1.5;

/// Reconnect delay: grows ×1.5 per failure up to 30s, back to 1s on success
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    interval: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            interval: BACKOFF_FLOOR,
        }
    }

    /// Current interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record a failed attempt and return the delay before the next one
    pub fn grow(&mut self) -> Duration {
        self.interval = self.interval.mul_f64(BACKOFF_FACTOR).min(MAX_BACKOFF);
        self.interval
    }

    /// Record a successful connect
    pub fn reset(&mut self) {
        self.interval = BACKOFF_FLOOR;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
