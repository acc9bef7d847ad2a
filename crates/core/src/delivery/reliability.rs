use std::time::Duration;

use serde::Serialize;

use crate::config::MonitorCfg;
use crate::types::{DeliveryStats, UploadOutcome};

/// Periodic delivery summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessRateReport {
    pub total: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Percentage, 0..=100.
    pub success_rate: f64,
    pub last_latency: Duration,
    pub mean_latency: Duration,
}

/// Tracks delivery outcomes and decides when the store session should be
/// rebuilt.
#[derive(Debug)]
pub struct UploadReliabilityController {
    stats: DeliveryStats,
    reinit_after: u32,
    report_every: u64,
    latency_sum: Duration,
}

impl UploadReliabilityController {
    /// `reinit_after`: consecutive failures tolerated before a rebuild is
    /// requested (a rebuild happens on the next failure after that).
    pub fn new(reinit_after: u32, report_every: u64) -> Self {
        Self {
            stats: DeliveryStats::default(),
            reinit_after,
            report_every: report_every.max(1),
            latency_sum: Duration::ZERO,
        }
    }

    pub fn from_cfg(cfg: &MonitorCfg) -> Self {
        Self::new(cfg.reinit_after_failures, cfg.stats_report_every)
    }

    /// Record one completed attempt. Every `report_every`th attempt yields a
    /// success-rate report, which is also logged.
    pub fn record_attempt(&mut self, outcome: &UploadOutcome) -> Option<SuccessRateReport> {
        if outcome.success {
            self.stats.success_count += 1;
            self.stats.consecutive_ready_failures = 0;
        } else {
            self.stats.failure_count += 1;
            self.stats.consecutive_ready_failures += 1;
            self.stats.last_error = outcome.error.clone();
        }
        self.stats.last_latency = outcome.latency;
        self.latency_sum += outcome.latency;
        let total = self.stats.total();
        self.stats.mean_latency = self.latency_sum / total.min(u64::from(u32::MAX)) as u32;

        if total % self.report_every != 0 {
            return None;
        }
        let report = SuccessRateReport {
            total,
            success_count: self.stats.success_count,
            failure_count: self.stats.failure_count,
            success_rate: self.stats.success_rate().unwrap_or_default(),
            last_latency: self.stats.last_latency,
            mean_latency: self.stats.mean_latency,
        };
        tracing::info!(
            total = report.total,
            success = report.success_count,
            failed = report.failure_count,
            rate_pct = report.success_rate,
            mean_latency_ms = report.mean_latency.as_millis() as u64,
            "delivery success rate"
        );
        Some(report)
    }

    /// True once the consecutive failure count exceeds the threshold. Resets
    /// the count, so each run of failures requests at most one rebuild.
    pub fn should_reinitialize(&mut self) -> bool {
        if self.stats.consecutive_ready_failures > self.reinit_after {
            tracing::warn!(
                consecutive = self.stats.consecutive_ready_failures,
                "too many consecutive delivery failures, rebuilding store session"
            );
            self.stats.consecutive_ready_failures = 0;
            true
        } else {
            false
        }
    }

    pub fn report(&self) -> DeliveryStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ok(ms: u64) -> UploadOutcome {
        UploadOutcome::succeeded(Duration::from_millis(ms), Utc::now())
    }

    fn fail() -> UploadOutcome {
        UploadOutcome::failed(Duration::from_millis(10), Utc::now(), "timeout")
    }

    #[test]
    fn six_failures_request_one_rebuild() {
        let mut c = UploadReliabilityController::new(5, 10);
        let mut rebuilds = 0;
        for n in 1..=6 {
            c.record_attempt(&fail());
            if c.should_reinitialize() {
                rebuilds += 1;
                assert_eq!(n, 6);
            }
        }
        assert_eq!(rebuilds, 1);
        assert_eq!(c.report().consecutive_ready_failures, 0);
        assert_eq!(c.report().failure_count, 6);
    }

    #[test]
    fn success_clears_failure_run() {
        let mut c = UploadReliabilityController::new(5, 10);
        for _ in 0..5 {
            c.record_attempt(&fail());
        }
        c.record_attempt(&ok(5));
        c.record_attempt(&fail());
        assert!(!c.should_reinitialize());
        assert_eq!(c.report().consecutive_ready_failures, 1);
    }

    #[test]
    fn report_every_tenth_attempt() {
        let mut c = UploadReliabilityController::new(5, 10);
        let mut reports = Vec::new();
        for n in 1..=25u64 {
            let outcome = if n % 4 == 0 { fail() } else { ok(20) };
            if let Some(r) = c.record_attempt(&outcome) {
                reports.push(r);
            }
        }
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].total, 10);
        assert_eq!(reports[0].success_count, 8);
        assert_eq!(reports[0].success_rate, 80.0);
        assert_eq!(reports[1].total, 20);
        assert_eq!(reports[1].failure_count, 5);
    }

    #[test]
    fn latency_tracking() {
        let mut c = UploadReliabilityController::new(5, 10);
        c.record_attempt(&ok(10));
        c.record_attempt(&ok(30));
        let s = c.report();
        assert_eq!(s.last_latency, Duration::from_millis(30));
        assert_eq!(s.mean_latency, Duration::from_millis(20));
        assert_eq!(s.last_error, None);
        c.record_attempt(&fail());
        assert_eq!(c.report().last_error.as_deref(), Some("timeout"));
    }
}
