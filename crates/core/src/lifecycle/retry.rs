use std::future::Future;
use std::time::Duration;

use crate::config::MonitorCfg;

/// Fixed-delay retry for link bring-up. No backoff: attempts are spaced
/// evenly so the total wait is bounded by `max_attempts * delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_cfg(cfg: &MonitorCfg) -> Self {
        Self::new(
            cfg.network_max_attempts,
            Duration::from_millis(cfg.network_retry_delay_ms),
        )
    }

    /// Run `op` until it succeeds or the attempt budget is spent. `op`
    /// receives the 1-based attempt number. On exhaustion the last error is
    /// returned alongside the number of attempts made.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<(T, u32), (E, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if attempt >= self.max_attempts => return Err((e, attempt)),
                Err(e) => {
                    tracing::debug!(attempt, max = self.max_attempts, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
