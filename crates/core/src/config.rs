use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::sensing::CalibrationRange;

/// Prefix for environment variable overrides, e.g. `CIRCUITWATCH_CURRENT_THRESHOLD_A`.
pub const ENV_PREFIX: &str = "CIRCUITWATCH_";

/// All circuitwatch tunables. Defaults match the reference hardware build;
/// any key can be overridden through [`MonitorCfg::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorCfg {
    /// Tag written by the store self-test and attached to log lines.
    pub device_id: String,

    // detection thresholds
    pub current_threshold_a: f32,
    pub voltage_drop_threshold_v: f32,
    pub power_threshold_w: f32,
    pub alert_cooldown_ms: u64,

    // filter
    pub filter_window: usize,
    pub calibration: CalibrationRange,

    // tick loop intervals (ms)
    pub tick_pause_ms: u64,
    pub telemetry_interval_ms: u64,
    pub display_interval_ms: u64,
    pub debug_interval_ms: u64,
    pub sim_update_ms: u64,

    // delivery
    pub store_timeout_ms: u64,
    pub reinit_after_failures: u32,
    pub stats_report_every: u64,

    // network
    pub network_max_attempts: u32,
    pub network_retry_delay_ms: u64,
    pub link_check_ms: u64,

    // shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            device_id: "circuitwatch".into(),
            current_threshold_a: 3.0,
            voltage_drop_threshold_v: 8.0,
            power_threshold_w: 50.0,
            alert_cooldown_ms: 2000,
            filter_window: 10,
            calibration: CalibrationRange::Range32V2A,
            tick_pause_ms: 50,
            telemetry_interval_ms: 5000,
            display_interval_ms: 1000,
            debug_interval_ms: 5000,
            sim_update_ms: 100,
            store_timeout_ms: 10_000,
            reinit_after_failures: 5,
            stats_report_every: 10,
            network_max_attempts: 30,
            network_retry_delay_ms: 1000,
            link_check_ms: 5000,
            shutdown_timeout_secs: 5,
        }
    }
}

impl MonitorCfg {
    /// Load overrides from `CIRCUITWATCH_*` environment variables. Unset or
    /// unparsable keys keep their defaults.
    pub fn from_env() -> Self {
        let map: HashMap<String, String> = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .map(|key| (key.to_ascii_lowercase(), v))
            })
            .collect();
        Self::from_map(&map)
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            device_id: get_or(m, "device_id", d.device_id),
            current_threshold_a: get_or(m, "current_threshold_a", d.current_threshold_a),
            voltage_drop_threshold_v: get_or(m, "voltage_drop_threshold_v", d.voltage_drop_threshold_v),
            power_threshold_w: get_or(m, "power_threshold_w", d.power_threshold_w),
            alert_cooldown_ms: get_or(m, "alert_cooldown_ms", d.alert_cooldown_ms),
            filter_window: get_or(m, "filter_window", d.filter_window).max(1),
            calibration: get_or(m, "calibration", d.calibration),
            tick_pause_ms: get_or(m, "tick_pause_ms", d.tick_pause_ms),
            telemetry_interval_ms: get_or(m, "telemetry_interval_ms", d.telemetry_interval_ms),
            display_interval_ms: get_or(m, "display_interval_ms", d.display_interval_ms),
            debug_interval_ms: get_or(m, "debug_interval_ms", d.debug_interval_ms),
            sim_update_ms: get_or(m, "sim_update_ms", d.sim_update_ms),
            store_timeout_ms: get_or(m, "store_timeout_ms", d.store_timeout_ms).max(1),
            reinit_after_failures: get_or(m, "reinit_after_failures", d.reinit_after_failures),
            stats_report_every: get_or(m, "stats_report_every", d.stats_report_every).max(1),
            network_max_attempts: get_or(m, "network_max_attempts", d.network_max_attempts).max(1),
            network_retry_delay_ms: get_or(m, "network_retry_delay_ms", d.network_retry_delay_ms),
            link_check_ms: get_or(m, "link_check_ms", d.link_check_ms),
            shutdown_timeout_secs: get_or(m, "shutdown_timeout_secs", d.shutdown_timeout_secs),
        }
    }

    /// Every key with its current value and a description, for startup logging.
    pub fn to_entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("device_id", self.device_id.clone(), "Device tag for self-test writes and logs"),
            ("current_threshold_a", self.current_threshold_a.to_string(), "Overload current threshold (A)"),
            ("voltage_drop_threshold_v", self.voltage_drop_threshold_v.to_string(), "Voltage drop threshold (V)"),
            ("power_threshold_w", self.power_threshold_w.to_string(), "Power spike threshold (W)"),
            ("alert_cooldown_ms", self.alert_cooldown_ms.to_string(), "Minimum time between short-circuit events"),
            ("filter_window", self.filter_window.to_string(), "Moving average window size"),
            ("calibration", self.calibration.to_string(), "Sensor calibration range"),
            ("tick_pause_ms", self.tick_pause_ms.to_string(), "Pause at the end of each tick"),
            ("telemetry_interval_ms", self.telemetry_interval_ms.to_string(), "Telemetry upload interval"),
            ("display_interval_ms", self.display_interval_ms.to_string(), "Display refresh interval"),
            ("debug_interval_ms", self.debug_interval_ms.to_string(), "Sensor status log interval"),
            ("sim_update_ms", self.sim_update_ms.to_string(), "Synthetic signal refresh interval"),
            ("store_timeout_ms", self.store_timeout_ms.to_string(), "Timeout for each remote store call"),
            ("reinit_after_failures", self.reinit_after_failures.to_string(), "Consecutive failures before store session reinit"),
            ("stats_report_every", self.stats_report_every.to_string(), "Attempts between delivery statistics reports"),
            ("network_max_attempts", self.network_max_attempts.to_string(), "Network link attempts before giving up"),
            ("network_retry_delay_ms", self.network_retry_delay_ms.to_string(), "Delay between network link attempts"),
            ("link_check_ms", self.link_check_ms.to_string(), "Interval between active network link checks"),
            ("shutdown_timeout_secs", self.shutdown_timeout_secs.to_string(), "Graceful shutdown timeout seconds"),
        ]
    }

    pub fn tick_pause(&self) -> Duration {
        Duration::from_millis(self.tick_pause_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
