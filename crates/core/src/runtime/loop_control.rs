use std::time::Duration;

/// Elapsed-time gate for work that runs less often than the tick loop.
/// Fires once `every` has passed since it last fired (or since creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalGate {
    every: Duration,
    last: Duration,
}

impl IntervalGate {
    pub fn new(every: Duration, now: Duration) -> Self {
        Self { every, last: now }
    }

    pub fn from_millis(ms: u64, now: Duration) -> Self {
        Self::new(Duration::from_millis(ms), now)
    }

    /// True when the interval has elapsed; the gate then restarts at `now`.
    pub fn due(&mut self, now: Duration) -> bool {
        if now.saturating_sub(self.last) >= self.every {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn every(&self) -> Duration {
        self.every
    }
}
