use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock seconds below which the clock is considered never synchronized
/// (a board that booted without time sync reports the epoch plus uptime).
pub const WALL_SYNC_FLOOR_SECS: i64 = 16 * 3600;

/// Time source injected into every component that gates on elapsed time.
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn monotonic(&self) -> Duration;

    /// Wall-clock time for event and telemetry records. May be unsynchronized.
    fn wall(&self) -> DateTime<Utc>;
}

/// Whether a wall-clock reading looks synchronized.
pub fn wall_synced(at: DateTime<Utc>) -> bool {
    at.timestamp() >= WALL_SYNC_FLOOR_SECS
}

/// Record key used for the remote paths: unix seconds.
pub fn timestamp_key(at: DateTime<Utc>) -> String {
    at.timestamp().to_string()
}

/// Tokio-backed clock. Uses `tokio::time::Instant` so paused-time tests drive it.
#[derive(Debug)]
pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
    wall_secs: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock whose wall time starts at `wall_secs` unix seconds.
    pub fn starting_at(wall_secs: i64) -> Self {
        Self {
            millis: AtomicU64::new(0),
            wall_secs: AtomicI64::new(wall_secs),
        }
    }

    /// Advance both monotonic and wall time.
    pub fn advance(&self, by: Duration) {
        let before = self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        let after = before + by.as_millis() as u64;
        let whole_secs = (after / 1000 - before / 1000) as i64;
        self.wall_secs.fetch_add(whole_secs, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn wall(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.wall_secs.load(Ordering::SeqCst), 0)
            .unwrap_or_default()
    }
}
